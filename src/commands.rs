//! Slash-command dispatch.
//!
//! Every command goes through the same steps: parse the name, check the
//! argument count against the command table, check the sender's role, then
//! run the command. Failures become a reply to the sender in their own
//! language, followed by a usage example where that helps.

use crate::error::{Refusal, RelayError};
use crate::i18n::{Language, LanguageRegistry, Localizer, Text};
use crate::roster::{normalize_identity, Member, Role};
use crate::store::Store;
use crate::translation::TranslationClient;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Longest window `/stats` accepts, in days.
const MAX_STATS_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    Remove,
    List,
    Test,
    Stats,
    LastPost,
    Say,
    Help,
}

/// Static description of a command: how it is typed, who may run it, and
/// how many arguments it takes.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub min_role: Role,
    pub min_args: usize,
    /// `None` means the rest of the line is free text
    pub max_args: Option<usize>,
    pub usage: &'static str,
}

static ADD: CommandSpec = CommandSpec {
    name: "/add",
    min_role: Role::Admin,
    min_args: 4,
    max_args: Some(4),
    usage: "/add +12345678900 en xX_bob_Xx user",
};

static REMOVE: CommandSpec = CommandSpec {
    name: "/remove",
    min_role: Role::Admin,
    min_args: 1,
    max_args: Some(1),
    usage: "/remove +12345678900\n/remove username",
};

static LIST: CommandSpec = CommandSpec {
    name: "/list",
    min_role: Role::Admin,
    min_args: 0,
    max_args: Some(0),
    usage: "/list",
};

static TEST: CommandSpec = CommandSpec {
    name: "/test",
    min_role: Role::User,
    min_args: 2,
    max_args: None,
    usage: "/test es How are you today?",
};

static STATS: CommandSpec = CommandSpec {
    name: "/stats",
    min_role: Role::Admin,
    min_args: 2,
    max_args: Some(3),
    usage: "/stats 1 day +12345678900\n/stats 7 days name\n/stats 30 days",
};

static LAST_POST: CommandSpec = CommandSpec {
    name: "/lastpost",
    min_role: Role::Admin,
    min_args: 0,
    max_args: Some(1),
    usage: "/lastpost\n/lastpost name",
};

static SAY: CommandSpec = CommandSpec {
    name: "/say",
    min_role: Role::User,
    min_args: 1,
    max_args: None,
    usage: "/say /this is not a command",
};

static HELP: CommandSpec = CommandSpec {
    name: "/help",
    min_role: Role::User,
    min_args: 0,
    max_args: None,
    usage: "/help",
};

impl Command {
    /// Every command, in the order `/help` lists them.
    pub const ALL: [Command; 8] = [
        Command::Add,
        Command::Remove,
        Command::List,
        Command::Test,
        Command::Stats,
        Command::LastPost,
        Command::Say,
        Command::Help,
    ];

    /// Look up a command by its typed name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Command> {
        Command::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(name))
    }

    pub fn spec(self) -> &'static CommandSpec {
        match self {
            Command::Add => &ADD,
            Command::Remove => &REMOVE,
            Command::List => &LIST,
            Command::Test => &TEST,
            Command::Stats => &STATS,
            Command::LastPost => &LAST_POST,
            Command::Say => &SAY,
            Command::Help => &HELP,
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

/// Split on whitespace. Display names never contain whitespace, so every
/// argument is exactly one token.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// The text after the first `n` tokens, with its inner spacing intact.
pub fn rest_after(text: &str, n: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest.trim_end()
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation<'a> {
    pub command: Command,
    pub args: Vec<&'a str>,
    /// Everything after the command name, spacing preserved
    pub rest: &'a str,
}

impl<'a> Invocation<'a> {
    /// Parse `text` (which starts with `/`) and check its argument count.
    pub fn parse(text: &'a str) -> Result<Self, Failure> {
        let tokens = tokenize(text);
        let Some((&name, args)) = tokens.split_first() else {
            return Err(Failure::new(Text::UnknownCommand).with_help());
        };
        let command = Command::from_name(name)
            .ok_or_else(|| Failure::new(Text::UnknownCommand).with_help())?;

        let spec = command.spec();
        let too_many = spec.max_args.is_some_and(|max| args.len() > max);
        if args.len() < spec.min_args || too_many {
            return Err(Failure::new(Text::Usage).with_usage(command));
        }

        Ok(Self {
            command,
            args: args.to_vec(),
            rest: rest_after(text, 1),
        })
    }
}

/// What the pipeline should do after a command ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send this text back to the sender only
    Reply(String),
    /// Relay this text to the group as a chat message
    Relay(String),
}

/// A command that could not complete, described as reply fragments so it
/// can be localized.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    texts: Vec<Text>,
    detail: Option<String>,
    usage: Option<Command>,
    help: bool,
}

impl Failure {
    pub fn new(text: Text) -> Self {
        Self {
            texts: vec![text],
            detail: None,
            usage: None,
            help: false,
        }
    }

    fn also(mut self, text: Text) -> Self {
        self.texts.push(text);
        self
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_usage(mut self, command: Command) -> Self {
        self.usage = Some(command);
        self
    }

    fn with_help(mut self) -> Self {
        self.help = true;
        self
    }

    pub fn texts(&self) -> &[Text] {
        &self.texts
    }
}

impl From<Refusal> for Failure {
    fn from(refusal: Refusal) -> Self {
        Failure::new(match refusal {
            Refusal::InsufficientRole => Text::NotAllowed,
            Refusal::SuperOnly => Text::SuperOnly,
            Refusal::RemoveSelf => Text::RemoveSelf,
            Refusal::RemoveSuper => Text::RemoveSuper,
            Refusal::RemoveLastSuper => Text::RemoveLastSuper,
        })
    }
}

impl From<RelayError> for Failure {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Validation(_) => Failure::new(Text::Usage),
            RelayError::Forbidden(refusal) => refusal.into(),
            RelayError::NotFound(_) => Failure::new(Text::NotFound),
            RelayError::DuplicateMember(_) => Failure::new(Text::Exists),
            RelayError::InvalidLanguage(_) => Failure::new(Text::LanguageError)
                .also(Text::Languages)
                .with_detail(LanguageRegistry::get().describe()),
            RelayError::InvalidRole(_) => {
                Failure::new(Text::RoleError).with_detail("user | admin | super")
            }
            RelayError::TranslationUnavailable(_) => Failure::new(Text::TranslationFailed),
            RelayError::Persistence(_) => Failure::new(Text::SaveFailed),
        }
    }
}

/// Runs slash commands against the store on behalf of members.
pub struct Dispatcher {
    store: Arc<Store>,
    translator: Arc<TranslationClient>,
    localizer: Arc<Localizer>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<Store>,
        translator: Arc<TranslationClient>,
        localizer: Arc<Localizer>,
    ) -> Self {
        Self {
            store,
            translator,
            localizer,
        }
    }

    /// Run the command line `text` sent by `sender`.
    pub async fn dispatch(&self, sender: &Member, text: &str, now: DateTime<Utc>) -> Outcome {
        let language = sender.language();

        let invocation = match Invocation::parse(text) {
            Ok(invocation) => invocation,
            Err(failure) => return Outcome::Reply(self.render(failure, sender, language).await),
        };

        info!(
            "Command {} from {} ({})",
            invocation.command.name(),
            sender.name,
            sender.role
        );

        match self.run(sender, &invocation, now).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!(
                    "Command {} from {} failed: {:?}",
                    invocation.command.name(),
                    sender.name,
                    failure.texts()
                );
                Outcome::Reply(self.render(failure, sender, language).await)
            }
        }
    }

    async fn run(
        &self,
        sender: &Member,
        invocation: &Invocation<'_>,
        now: DateTime<Utc>,
    ) -> Result<Outcome, Failure> {
        let command = invocation.command;
        if sender.role < command.spec().min_role {
            return Err(Refusal::InsufficientRole.into());
        }

        let reply = match command {
            Command::Add => self.add(sender, &invocation.args).await,
            Command::Remove => self.remove(sender, invocation.args[0]).await,
            Command::List => Ok(self.list(sender).await),
            Command::Test => self.test(sender, invocation).await,
            Command::Stats => self.stats(sender, &invocation.args, now).await,
            Command::LastPost => self.last_post(sender, invocation.args.first().copied()).await,
            Command::Say => return Ok(Outcome::Relay(invocation.rest.to_string())),
            Command::Help => Ok(self.help(sender).await),
        };

        reply.map(Outcome::Reply).map_err(|failure| {
            if failure.usage.is_none() && failure.texts == [Text::Usage] {
                failure.with_usage(command)
            } else {
                failure
            }
        })
    }

    // ==================== Roster Commands ====================

    async fn add(&self, sender: &Member, args: &[&str]) -> Result<String, Failure> {
        let &[identity, lang, name, role] = args else {
            return Err(Failure::new(Text::Usage).with_usage(Command::Add));
        };

        let identity = normalize_identity(identity)
            .map_err(|_| Failure::new(Text::PhoneError).with_usage(Command::Add))?;
        let language = Language::from_code(lang)?;
        let role: Role = role.parse()?;
        if role == Role::Super && sender.role != Role::Super {
            return Err(Refusal::SuperOnly.into());
        }
        let member = Member::new(&identity, language.code(), name, role)
            .map_err(|_| Failure::new(Text::NameError).with_usage(Command::Add))?;

        let line = member_line(&member);
        self.store.add_member(member)?;
        info!("{} added {}", sender.name, line);

        Ok(format!(
            "{}\n{}",
            self.localizer.get(Text::Added, sender.language()).await,
            line
        ))
    }

    async fn remove(&self, sender: &Member, key: &str) -> Result<String, Failure> {
        let removed = self.store.remove_member(sender, key)?;
        info!("{} removed {}", sender.name, removed.name);

        Ok(format!(
            "{}\n{}",
            self.localizer.get(Text::Removed, sender.language()).await,
            member_line(&removed)
        ))
    }

    async fn list(&self, sender: &Member) -> String {
        let mut lines = vec![self.localizer.get(Text::ListHeaders, sender.language()).await];
        lines.extend(self.store.members().iter().map(member_line));
        lines.join("\n")
    }

    // ==================== Translation Commands ====================

    async fn test(&self, sender: &Member, invocation: &Invocation<'_>) -> Result<String, Failure> {
        let target = Language::from_code(invocation.args[0])?;
        let message = rest_after(invocation.rest, 1);
        let own = sender.language();

        let translated = self.translator.translate(message, Some(own), target).await?;
        let back = self
            .translator
            .translate(&translated, Some(target), own)
            .await?;

        let headers = self
            .localizer
            .get_all(&[Text::TestTranslation, Text::TestBackTranslation], own)
            .await;
        Ok(format!(
            "{}\n{}\n{}\n{}",
            headers[0], translated, headers[1], back
        ))
    }

    // ==================== Log Commands ====================

    async fn stats(
        &self,
        sender: &Member,
        args: &[&str],
        now: DateTime<Utc>,
    ) -> Result<String, Failure> {
        let days = parse_window(args[0], args[1])
            .ok_or_else(|| Failure::new(Text::StatsError).with_usage(Command::Stats))?;
        let targets = self.targets(args.get(2).copied())?;
        let since = now - Duration::days(days);

        let mut lines = vec![self.localizer.get(Text::StatsHeaders, sender.language()).await];
        for member in &targets {
            let count = self.store.count_since(Some(&member.identity), since);
            lines.push(format!("{}, {}, {}", member.name, member.identity, count));
        }
        Ok(lines.join("\n"))
    }

    async fn last_post(&self, sender: &Member, key: Option<&str>) -> Result<String, Failure> {
        let targets = self.targets(key)?;

        let posts: Vec<String> = targets
            .iter()
            .filter_map(|member| {
                self.store.last_post(Some(&member.identity)).map(|ts| {
                    format!(
                        "{}, {}, {}",
                        member.name,
                        member.identity,
                        ts.format("%Y-%m-%d %H:%M UTC")
                    )
                })
            })
            .collect();

        if posts.is_empty() {
            return Err(Failure::new(Text::NoPosts));
        }

        let header = self
            .localizer
            .get(Text::LastPostHeaders, sender.language())
            .await;
        Ok(std::iter::once(header)
            .chain(posts)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// One member by identity or name, or the whole roster.
    fn targets(&self, key: Option<&str>) -> Result<Vec<Member>, Failure> {
        match key {
            Some(key) => self
                .store
                .find(key)
                .map(|member| vec![member])
                .ok_or_else(|| RelayError::NotFound(key.to_string()).into()),
            None => Ok(self.store.members()),
        }
    }

    // ==================== Help ====================

    async fn help(&self, sender: &Member) -> String {
        let mut lines = vec![self.localizer.get(Text::Commands, sender.language()).await];
        lines.extend(
            Command::ALL
                .iter()
                .map(|command| command.spec())
                .filter(|spec| sender.role >= spec.min_role)
                .map(|spec| spec.usage.to_string()),
        );
        lines.join("\n")
    }

    /// Localize a failure for `sender`.
    async fn render(&self, failure: Failure, sender: &Member, language: Language) -> String {
        let mut out = self.localizer.get_all(&failure.texts, language).await.join(" ");

        if let Some(detail) = &failure.detail {
            out.push('\n');
            out.push_str(detail);
        }
        if let Some(command) = failure.usage {
            out.push('\n');
            out.push_str(&self.localizer.get(Text::Example, language).await);
            out.push('\n');
            out.push_str(command.spec().usage);
        }
        if failure.help {
            out.push('\n');
            out.push_str(&self.help(sender).await);
        }
        out
    }
}

/// `name, identity, lang, role`
fn member_line(member: &Member) -> String {
    format!(
        "{}, {}, {}, {}",
        member.name, member.identity, member.lang, member.role
    )
}

/// `<days> day|days` as a positive day count.
fn parse_window(days: &str, unit: &str) -> Option<i64> {
    if !matches!(unit.to_ascii_lowercase().as_str(), "day" | "days") {
        return None;
    }
    days.parse::<i64>()
        .ok()
        .filter(|d| (1..=MAX_STATS_DAYS).contains(d))
}
