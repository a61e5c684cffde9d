use crate::error::{Refusal, RelayError, RelayResult};
use crate::i18n::Language;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Authorization tier of a member, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Super,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Super => "super",
        }
    }
}

impl FromStr for Role {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super" => Ok(Role::Super),
            _ => Err(RelayError::InvalidRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[0-9]{6,15}$").expect("phone regex is valid"))
}

/// Normalize a contact handle to `+<digits>`.
///
/// Accepts the `whatsapp:` channel prefix Twilio puts on inbound numbers.
pub fn normalize_identity(raw: &str) -> RelayResult<String> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix("whatsapp:").unwrap_or(trimmed);

    if !phone_regex().is_match(bare) {
        return Err(RelayError::Validation(format!(
            "Invalid phone number: '{}'",
            raw
        )));
    }

    Ok(format!("+{}", bare.trim_start_matches('+')))
}

/// Whether `key` should be resolved as an identity rather than a display name.
pub fn looks_like_identity(key: &str) -> bool {
    let bare = key.strip_prefix("whatsapp:").unwrap_or(key);
    phone_regex().is_match(bare)
}

/// Display names compare case-insensitively, including non-ASCII letters.
fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Normalized `+<digits>` contact handle
    pub identity: String,
    /// Unique single-word display name
    pub name: String,
    /// Preferred language code
    pub lang: String,
    pub role: Role,
}

impl Member {
    /// Build a validated member.
    ///
    /// Display names must be one whitespace-free token and must not look like
    /// a phone number, so `/remove <identity_or_display_name>` is unambiguous.
    pub fn new(identity: &str, lang: &str, name: &str, role: Role) -> RelayResult<Self> {
        let identity = normalize_identity(identity)?;
        let language = Language::from_code(lang)?;

        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(RelayError::Validation(format!(
                "Invalid display name: '{}'",
                name
            )));
        }
        if looks_like_identity(name) {
            return Err(RelayError::Validation(format!(
                "Display name cannot be a phone number: '{}'",
                name
            )));
        }

        Ok(Self {
            identity,
            name: name.to_string(),
            lang: language.code().to_string(),
            role,
        })
    }

    /// The member's language; codes no longer in the registry fall back to
    /// the canonical language.
    pub fn language(&self) -> Language {
        Language::from_code(&self.lang).unwrap_or_else(|_| Language::canonical())
    }

    pub fn matches(&self, key: &str) -> bool {
        if looks_like_identity(key) {
            normalize_identity(key).is_ok_and(|identity| self.identity == identity)
        } else {
            same_name(&self.name, key)
        }
    }
}

/// Insertion-ordered set of members with unique identities and names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// Resolve by identity (phone-number-like keys) or display name
    /// (case-insensitive).
    pub fn find(&self, key: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.matches(key))
    }

    pub fn get(&self, identity: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.identity == identity)
    }

    pub fn super_count(&self) -> usize {
        self.members.iter().filter(|m| m.role == Role::Super).count()
    }

    pub fn add(&mut self, member: Member) -> RelayResult<()> {
        if self.get(&member.identity).is_some() {
            return Err(RelayError::DuplicateMember(member.identity));
        }
        if self
            .members
            .iter()
            .any(|m| same_name(&m.name, &member.name))
        {
            return Err(RelayError::DuplicateMember(member.name));
        }

        self.members.push(member);
        Ok(())
    }

    /// Remove the member matching `key` on behalf of `actor`.
    ///
    /// Refused when the actor targets themself, when a non-super targets a
    /// super, or when the target is the only remaining super.
    pub fn remove(&mut self, actor: &Member, key: &str) -> RelayResult<Member> {
        let idx = self
            .members
            .iter()
            .position(|m| m.matches(key))
            .ok_or_else(|| RelayError::NotFound(key.to_string()))?;

        let target = &self.members[idx];
        if target.identity == actor.identity {
            return Err(RelayError::Forbidden(Refusal::RemoveSelf));
        }
        if target.role == Role::Super {
            if actor.role != Role::Super {
                return Err(RelayError::Forbidden(Refusal::RemoveSuper));
            }
            if self.super_count() <= 1 {
                return Err(RelayError::Forbidden(Refusal::RemoveLastSuper));
            }
        }

        Ok(self.members.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(identity: &str, lang: &str, name: &str, role: Role) -> Member {
        Member::new(identity, lang, name, role).expect("valid member")
    }

    fn sample_roster() -> Roster {
        let mut roster = Roster::new();
        roster.add(member("+10000000001", "en", "root", Role::Super)).unwrap();
        roster.add(member("+10000000002", "es", "ana", Role::Admin)).unwrap();
        roster.add(member("+10000000003", "cs", "petr", Role::User)).unwrap();
        roster
    }

    // ==================== Role Tests ====================

    #[test]
    fn test_role_parse() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("super".parse::<Role>().unwrap(), Role::Super);
        assert!(matches!(
            "owner".parse::<Role>(),
            Err(RelayError::InvalidRole(r)) if r == "owner"
        ));
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::User < Role::Admin);
        assert!(Role::Admin < Role::Super);
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    // ==================== Identity Tests ====================

    #[test]
    fn test_normalize_identity_variants() {
        assert_eq!(normalize_identity("+12345678900").unwrap(), "+12345678900");
        assert_eq!(normalize_identity("12345678900").unwrap(), "+12345678900");
        assert_eq!(
            normalize_identity("whatsapp:+12345678900").unwrap(),
            "+12345678900"
        );
    }

    #[test]
    fn test_normalize_identity_rejects_letters() {
        assert!(normalize_identity("+1234abc").is_err());
        assert!(normalize_identity("").is_err());
        assert!(normalize_identity("+12").is_err());
    }

    // ==================== Member Tests ====================

    #[test]
    fn test_member_new_validates_language() {
        let err = Member::new("+12345678900", "xx", "bob", Role::User).unwrap_err();
        assert!(matches!(err, RelayError::InvalidLanguage(_)));
    }

    #[test]
    fn test_member_new_rejects_whitespace_name() {
        let err = Member::new("+12345678900", "en", "bob smith", Role::User).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[test]
    fn test_member_new_rejects_numeric_name() {
        assert!(Member::new("+12345678900", "en", "+19998887777", Role::User).is_err());
    }

    #[test]
    fn test_member_language_falls_back_for_unknown_code() {
        let mut m = member("+12345678900", "es", "bob", Role::User);
        assert_eq!(m.language(), Language::SPANISH);
        m.lang = "zz".to_string();
        assert_eq!(m.language(), Language::canonical());
    }

    // ==================== Roster Tests ====================

    #[test]
    fn test_add_preserves_insertion_order() {
        let roster = sample_roster();
        let names: Vec<_> = roster.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["root", "ana", "petr"]);
    }

    #[test]
    fn test_add_duplicate_identity() {
        let mut roster = sample_roster();
        let err = roster
            .add(member("10000000002", "en", "other", Role::User))
            .unwrap_err();
        assert!(matches!(err, RelayError::DuplicateMember(_)));
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_add_duplicate_name_is_case_insensitive() {
        let mut roster = sample_roster();
        let err = roster
            .add(member("+10000000009", "en", "ANA", Role::User))
            .unwrap_err();
        assert!(matches!(err, RelayError::DuplicateMember(_)));
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_find_by_name_unicode_case() {
        let mut roster = sample_roster();
        roster
            .add(member("+10000000005", "cs", "Žofie", Role::User))
            .unwrap();
        assert_eq!(roster.find("žofie").unwrap().identity, "+10000000005");
    }

    #[test]
    fn test_find_by_identity_and_name() {
        let roster = sample_roster();
        assert_eq!(roster.find("+10000000003").unwrap().name, "petr");
        assert_eq!(roster.find("whatsapp:+10000000003").unwrap().name, "petr");
        assert_eq!(roster.find("Petr").unwrap().identity, "+10000000003");
        assert!(roster.find("nobody").is_none());
    }

    #[test]
    fn test_remove_by_name() {
        let mut roster = sample_roster();
        let actor = roster.find("root").unwrap().clone();

        let removed = roster.remove(&actor, "PETR").unwrap();

        assert_eq!(removed.name, "petr");
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_remove_not_found() {
        let mut roster = sample_roster();
        let actor = roster.find("root").unwrap().clone();
        assert!(matches!(
            roster.remove(&actor, "ghost"),
            Err(RelayError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_self_forbidden() {
        let mut roster = sample_roster();
        let actor = roster.find("ana").unwrap().clone();
        assert!(matches!(
            roster.remove(&actor, "ana"),
            Err(RelayError::Forbidden(Refusal::RemoveSelf))
        ));
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_admin_cannot_remove_super() {
        let mut roster = sample_roster();
        let actor = roster.find("ana").unwrap().clone();
        assert!(matches!(
            roster.remove(&actor, "root"),
            Err(RelayError::Forbidden(Refusal::RemoveSuper))
        ));
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_super_can_remove_other_super() {
        let mut roster = sample_roster();
        roster
            .add(member("+10000000004", "en", "second", Role::Super))
            .unwrap();
        let actor = roster.find("root").unwrap().clone();

        roster.remove(&actor, "second").unwrap();

        assert_eq!(roster.super_count(), 1);
    }

    #[test]
    fn test_last_super_cannot_be_removed() {
        // A super acting from outside the roster is the only way to target
        // the last remaining super without it being a self-removal.
        let mut roster = sample_roster();
        let outsider = member("+19999999999", "en", "outsider", Role::Super);
        assert!(matches!(
            roster.remove(&outsider, "root"),
            Err(RelayError::Forbidden(Refusal::RemoveLastSuper))
        ));
        assert_eq!(roster.super_count(), 1);
    }

    #[test]
    fn test_roster_serializes_as_array() {
        let json = serde_json::to_value(sample_roster()).unwrap();
        assert!(json.is_array());
        assert_eq!(json[1]["role"], "admin");
        assert_eq!(json[1]["lang"], "es");
    }
}
