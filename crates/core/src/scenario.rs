//! Scenario Registry
//!
//! The fixed catalogue of role-play scenarios. Each scenario pairs the
//! instructions shown to the human participant with the behavior directive
//! the model follows while playing the conversation partner.
//!
//! Scenario text lives in `scenarios/*.md` and is compiled into the binary.
//! Different prompt texts for the same nominal scenario are kept side by side
//! as numbered versions of one [`ScenarioId`].

use crate::session::SessionError;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

/// The closed set of scenario families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioId {
    ProfessionalDevelopment,
    ClubChoice,
    TeamCoordination,
    ChronicTardiness,
    PartTimeRequest,
    GradeDispute,
    StudyTripModeration,
    CareerCounseling,
    Feedback,
    ParentInterviewGuide,
}

impl ScenarioId {
    pub const ALL: [ScenarioId; 10] = [
        ScenarioId::ProfessionalDevelopment,
        ScenarioId::ClubChoice,
        ScenarioId::TeamCoordination,
        ScenarioId::ChronicTardiness,
        ScenarioId::PartTimeRequest,
        ScenarioId::GradeDispute,
        ScenarioId::StudyTripModeration,
        ScenarioId::CareerCounseling,
        ScenarioId::Feedback,
        ScenarioId::ParentInterviewGuide,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ScenarioId::ProfessionalDevelopment => "professional-development",
            ScenarioId::ClubChoice => "club-choice",
            ScenarioId::TeamCoordination => "team-coordination",
            ScenarioId::ChronicTardiness => "chronic-tardiness",
            ScenarioId::PartTimeRequest => "part-time-request",
            ScenarioId::GradeDispute => "grade-dispute",
            ScenarioId::StudyTripModeration => "study-trip-moderation",
            ScenarioId::CareerCounseling => "career-counseling",
            ScenarioId::Feedback => "feedback",
            ScenarioId::ParentInterviewGuide => "parent-interview-guide",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ScenarioId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        ScenarioId::ALL
            .into_iter()
            .find(|id| id.slug() == normalized)
            .ok_or_else(|| SessionError::NotFound(s.trim().to_string()))
    }
}

/// Lowercases and folds spaces and underscores into hyphens, so that
/// `"Feedback"`, `"club choice"` and `"club_choice"` all resolve.
fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// A versioned scenario identifier, written `slug` or `slug@version`.
///
/// A bare slug refers to version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ScenarioKey {
    pub id: ScenarioId,
    pub version: u16,
}

impl ScenarioKey {
    pub const fn new(id: ScenarioId, version: u16) -> Self {
        Self { id, version }
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

impl FromStr for ScenarioKey {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slug, version) = match s.trim().split_once('@') {
            Some((slug, version)) => {
                let version = version
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| SessionError::NotFound(s.trim().to_string()))?;
                (slug, version)
            }
            None => (s, 1),
        };
        let id = slug
            .parse::<ScenarioId>()
            .map_err(|_| SessionError::NotFound(s.trim().to_string()))?;
        Ok(Self { id, version })
    }
}

impl From<ScenarioKey> for String {
    fn from(key: ScenarioKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ScenarioKey {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Habermas-style classification of the exchange the scenario trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    Strategic,
    UnderstandingOriented,
}

impl fmt::Display for CommunicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunicationType::Strategic => write!(f, "strategic"),
            CommunicationType::UnderstandingOriented => write!(f, "understanding-oriented"),
        }
    }
}

/// The participant's social position relative to the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialRole {
    Subordinate,
    Equal,
    Superior,
}

impl fmt::Display for SocialRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocialRole::Subordinate => write!(f, "subordinate"),
            SocialRole::Equal => write!(f, "equal"),
            SocialRole::Superior => write!(f, "superior"),
        }
    }
}

/// One role-play setup. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    pub key: ScenarioKey,
    pub title: &'static str,
    /// How the partner is labelled in transcripts (e.g. "Principal").
    pub partner_label: &'static str,
    pub communication_type: CommunicationType,
    pub social_role: SocialRole,
    /// Shown to the human participant.
    pub instructions: &'static str,
    /// Sent to the model as the system turn; never shown as a chat message.
    pub partner_directive: &'static str,
}

macro_rules! builtin {
    ($id:ident, $version:literal, $file:literal, $title:literal, $partner:literal, $kind:ident, $role:ident) => {
        Scenario {
            key: ScenarioKey::new(ScenarioId::$id, $version),
            title: $title,
            partner_label: $partner,
            communication_type: CommunicationType::$kind,
            social_role: SocialRole::$role,
            instructions: include_str!(concat!("../scenarios/", $file, ".instructions.md")),
            partner_directive: include_str!(concat!("../scenarios/", $file, ".partner.md")),
        }
    };
}

fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        builtin!(
            ProfessionalDevelopment,
            1,
            "professional-development.v1",
            "Professional Development",
            "Principal",
            Strategic,
            Subordinate
        ),
        builtin!(
            ProfessionalDevelopment,
            2,
            "professional-development.v2",
            "Professional Development: Seminar Funding",
            "Principal",
            Strategic,
            Subordinate
        ),
        builtin!(
            ClubChoice,
            1,
            "club-choice.v1",
            "Advisory Talk about Club Choice",
            "Student",
            Strategic,
            Superior
        ),
        builtin!(
            TeamCoordination,
            1,
            "team-coordination.v1",
            "Team Coordination with a Colleague",
            "Colleague",
            UnderstandingOriented,
            Equal
        ),
        builtin!(
            ChronicTardiness,
            1,
            "chronic-tardiness.v1",
            "Chronic Tardiness Conversation",
            "Student",
            Strategic,
            Superior
        ),
        builtin!(
            PartTimeRequest,
            1,
            "part-time-request.v1",
            "Request to Reduce Workload to 50%",
            "Principal",
            Strategic,
            Subordinate
        ),
        builtin!(
            GradeDispute,
            1,
            "grade-dispute.v1",
            "Grade Dispute in Mathematics",
            "Parent",
            UnderstandingOriented,
            Equal
        ),
        builtin!(
            StudyTripModeration,
            1,
            "study-trip-moderation.v1",
            "Study Trip Moderation Neutrality",
            "Student",
            UnderstandingOriented,
            Superior
        ),
        builtin!(
            CareerCounseling,
            1,
            "career-counseling.v1",
            "Career Counseling: Art vs. Secure Alternatives",
            "Student",
            UnderstandingOriented,
            Superior
        ),
        builtin!(
            Feedback,
            1,
            "feedback.v1",
            "Building a Feedback Culture",
            "Principal",
            UnderstandingOriented,
            Subordinate
        ),
        builtin!(
            Feedback,
            2,
            "feedback.v2",
            "Feedback Culture Introduction",
            "Principal",
            UnderstandingOriented,
            Equal
        ),
        builtin!(
            ParentInterviewGuide,
            1,
            "parent-interview-guide.v1",
            "Co-Designing a Parent Interview Guide",
            "Colleague",
            UnderstandingOriented,
            Equal
        ),
    ]
}

/// Read-only lookup from [`ScenarioKey`] to [`Scenario`].
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<ScenarioKey, Arc<Scenario>>,
}

impl ScenarioRegistry {
    /// The catalogue shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_scenarios(builtin_scenarios())
    }

    /// Builds a registry from an explicit list. Later duplicates of a key win.
    pub fn from_scenarios(scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        let scenarios = scenarios
            .into_iter()
            .map(|s| (s.key, Arc::new(s)))
            .collect();
        Self { scenarios }
    }

    pub fn get(&self, key: &ScenarioKey) -> Result<Arc<Scenario>, SessionError> {
        self.scenarios
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }

    /// Parses `raw` as a [`ScenarioKey`] and looks it up.
    pub fn resolve(&self, raw: &str) -> Result<Arc<Scenario>, SessionError> {
        let key: ScenarioKey = raw.parse()?;
        self.get(&key)
    }

    /// All scenarios ordered by id, then version.
    pub fn list(&self) -> impl Iterator<Item = &Arc<Scenario>> {
        self.scenarios.values()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_id_has_a_first_version() {
        let registry = ScenarioRegistry::builtin();
        for id in ScenarioId::ALL {
            let scenario = registry
                .get(&ScenarioKey::new(id, 1))
                .unwrap_or_else(|_| panic!("missing scenario {id}@1"));
            assert!(!scenario.title.is_empty());
            assert!(!scenario.partner_label.is_empty());
            assert!(!scenario.instructions.trim().is_empty(), "{id}: empty instructions");
            assert!(
                !scenario.partner_directive.trim().is_empty(),
                "{id}: empty partner directive"
            );
        }
    }

    #[test]
    fn test_versions_carry_distinct_prompts() {
        let registry = ScenarioRegistry::builtin();
        let v1 = registry.resolve("feedback@1").unwrap();
        let v2 = registry.resolve("feedback@2").unwrap();
        assert_ne!(v1.partner_directive, v2.partner_directive);
        assert_eq!(registry.len(), 12);
    }

    #[test]
    fn test_key_parsing_is_forgiving() {
        let expected = ScenarioKey::new(ScenarioId::Feedback, 1);
        assert_eq!("Feedback".parse::<ScenarioKey>().unwrap(), expected);
        assert_eq!(" feedback@1 ".parse::<ScenarioKey>().unwrap(), expected);

        let club = "Club Choice".parse::<ScenarioKey>().unwrap();
        assert_eq!(club.id, ScenarioId::ClubChoice);
        let club = "club_choice@1".parse::<ScenarioKey>().unwrap();
        assert_eq!(club.id, ScenarioId::ClubChoice);
    }

    #[test]
    fn test_unknown_keys_are_not_found() {
        let registry = ScenarioRegistry::builtin();
        for raw in ["", "debate", "feedback@x", "feedback@9"] {
            match registry.resolve(raw) {
                Err(SessionError::NotFound(_)) => {}
                other => panic!("expected NotFound for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_key_display_round_trips_through_serde() {
        let key = ScenarioKey::new(ScenarioId::ParentInterviewGuide, 1);
        assert_eq!(key.to_string(), "parent-interview-guide@1");

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"parent-interview-guide@1\"");
        let back: ScenarioKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_social_role_values() {
        let registry = ScenarioRegistry::builtin();
        let principal = registry.resolve("professional-development").unwrap();
        let student = registry.resolve("club-choice").unwrap();
        assert_eq!(principal.social_role, SocialRole::Subordinate);
        assert_eq!(student.social_role, SocialRole::Superior);

        let values: Vec<String> = [SocialRole::Subordinate, SocialRole::Equal, SocialRole::Superior]
            .iter()
            .map(|role| serde_json::to_string(role).unwrap())
            .collect();
        assert_eq!(values, ["\"subordinate\"", "\"equal\"", "\"superior\""]);
    }

    #[test]
    fn test_list_is_ordered_by_id_then_version() {
        let registry = ScenarioRegistry::builtin();
        let keys: Vec<ScenarioKey> = registry.list().map(|s| s.key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys[0], ScenarioKey::new(ScenarioId::ProfessionalDevelopment, 1));
        assert_eq!(keys[1], ScenarioKey::new(ScenarioId::ProfessionalDevelopment, 2));
    }
}
