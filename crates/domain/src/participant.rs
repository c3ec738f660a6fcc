use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::participants::ParticipantDirectory;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    User,
    Vendor,
}

impl ParticipantKind {
    /// Accepts any casing the web client happens to send (`User`, `VENDOR`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(ParticipantKind::User),
            "vendor" => Some(ParticipantKind::Vendor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantKind::User => "user",
            ParticipantKind::Vendor => "vendor",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            ParticipantKind::User => ParticipantKind::Vendor,
            ParticipantKind::Vendor => ParticipantKind::User,
        }
    }

    /// Name of the realtime channel that reaches every connection bound to
    /// `participant_id` with this role.
    pub fn personal_channel(&self, participant_id: &str) -> String {
        format!("{}_{participant_id}", self.as_str())
    }

    pub fn is_personal_channel(room_id: &str) -> bool {
        [ParticipantKind::User, ParticipantKind::Vendor]
            .iter()
            .any(|kind| {
                room_id
                    .strip_prefix(kind.as_str())
                    .is_some_and(|rest| rest.starts_with('_'))
            })
    }
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorProfile {
    pub vendor_id: String,
    pub name: String,
    pub profile_image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Participant {
    User(UserProfile),
    Vendor(VendorProfile),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantCard {
    pub id: String,
    pub kind: ParticipantKind,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Participant {
    pub fn id(&self) -> &str {
        match self {
            Participant::User(user) => &user.user_id,
            Participant::Vendor(vendor) => &vendor.vendor_id,
        }
    }

    pub fn kind(&self) -> ParticipantKind {
        match self {
            Participant::User(_) => ParticipantKind::User,
            Participant::Vendor(_) => ParticipantKind::Vendor,
        }
    }

    pub fn card(&self) -> ParticipantCard {
        match self {
            Participant::User(user) => ParticipantCard {
                id: user.user_id.clone(),
                kind: ParticipantKind::User,
                name: user.name.clone(),
                avatar_url: user.image_url.clone(),
            },
            Participant::Vendor(vendor) => ParticipantCard {
                id: vendor.vendor_id.clone(),
                kind: ParticipantKind::Vendor,
                name: vendor.name.clone(),
                avatar_url: vendor.profile_image.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    pub user_id: String,
    pub vendor_id: String,
}

impl ParticipantPair {
    pub fn new(user_id: impl Into<String>, vendor_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            vendor_id: vendor_id.into(),
        }
    }

    pub fn side_of(&self, participant_id: &str) -> Option<ParticipantKind> {
        if self.user_id == participant_id {
            Some(ParticipantKind::User)
        } else if self.vendor_id == participant_id {
            Some(ParticipantKind::Vendor)
        } else {
            None
        }
    }

    pub fn id_for(&self, kind: ParticipantKind) -> &str {
        match kind {
            ParticipantKind::User => &self.user_id,
            ParticipantKind::Vendor => &self.vendor_id,
        }
    }

    pub fn counterpart_of(&self, participant_id: &str) -> Option<(ParticipantKind, &str)> {
        let side = self.side_of(participant_id)?;
        let other = side.other();
        Some((other, self.id_for(other)))
    }

    pub fn pair_key(&self) -> String {
        pair_key(&self.user_id, &self.vendor_id)
    }
}

pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NotFound,
    AmbiguousRole,
    NoComplementaryRole,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NotFound => f.write_str("not found in user or vendor store"),
            UnresolvedReason::AmbiguousRole => f.write_str("present in both user and vendor store"),
            UnresolvedReason::NoComplementaryRole => {
                f.write_str("no counterpart of the complementary type")
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnresolvedParticipant {
    pub participant_id: String,
    pub reason: UnresolvedReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPair {
    pub pair: ParticipantPair,
    pub user: UserProfile,
    pub vendor: VendorProfile,
}

struct Probe {
    id: String,
    user: Option<UserProfile>,
    vendor: Option<VendorProfile>,
}

impl Probe {
    fn only_kind(&self) -> Option<ParticipantKind> {
        match (&self.user, &self.vendor) {
            (Some(_), None) => Some(ParticipantKind::User),
            (None, Some(_)) => Some(ParticipantKind::Vendor),
            _ => None,
        }
    }

    fn unresolved(&self) -> Option<UnresolvedParticipant> {
        let reason = match (&self.user, &self.vendor) {
            (None, None) => UnresolvedReason::NotFound,
            (Some(_), Some(_)) => UnresolvedReason::AmbiguousRole,
            _ => return None,
        };
        Some(UnresolvedParticipant {
            participant_id: self.id.clone(),
            reason,
        })
    }
}

#[derive(Clone)]
pub struct ParticipantResolver {
    directory: Arc<dyn ParticipantDirectory>,
}

impl ParticipantResolver {
    pub fn new(directory: Arc<dyn ParticipantDirectory>) -> Self {
        Self { directory }
    }

    /// Decides which of two anonymous ids is the user and which the vendor.
    pub async fn resolve(&self, id_a: &str, id_b: &str) -> DomainResult<ResolvedPair> {
        if id_a == id_b {
            return Err(DomainError::Validation(
                "a chat needs two distinct participants".into(),
            ));
        }

        let a = self.probe(id_a).await?;
        let b = self.probe(id_b).await?;

        let a_user_b_vendor = a.user.is_some() && b.vendor.is_some();
        let a_vendor_b_user = a.vendor.is_some() && b.user.is_some();

        match (a_user_b_vendor, a_vendor_b_user) {
            (true, false) => Ok(ResolvedPair {
                pair: ParticipantPair::new(a.id, b.id),
                user: a.user.ok_or(DomainError::NotFound)?,
                vendor: b.vendor.ok_or(DomainError::NotFound)?,
            }),
            (false, true) => Ok(ResolvedPair {
                pair: ParticipantPair::new(b.id, a.id),
                user: b.user.ok_or(DomainError::NotFound)?,
                vendor: a.vendor.ok_or(DomainError::NotFound)?,
            }),
            _ => Err(Self::classify_failure(&a, &b)),
        }
    }

    pub async fn lookup(
        &self,
        participant_id: &str,
        kind: ParticipantKind,
    ) -> DomainResult<Option<Participant>> {
        let participant = match kind {
            ParticipantKind::User => self
                .directory
                .find_user(participant_id)
                .await?
                .map(Participant::User),
            ParticipantKind::Vendor => self
                .directory
                .find_vendor(participant_id)
                .await?
                .map(Participant::Vendor),
        };
        Ok(participant)
    }

    async fn probe(&self, participant_id: &str) -> DomainResult<Probe> {
        let user = self.directory.find_user(participant_id).await?;
        let vendor = self.directory.find_vendor(participant_id).await?;
        Ok(Probe {
            id: participant_id.to_string(),
            user,
            vendor,
        })
    }

    fn classify_failure(a: &Probe, b: &Probe) -> DomainError {
        if let (Some(kind_a), Some(kind_b)) = (a.only_kind(), b.only_kind()) {
            if kind_a == kind_b {
                return DomainError::SameTypePair(kind_a);
            }
        }

        let mut unresolved: Vec<_> = [a, b].iter().filter_map(|probe| probe.unresolved()).collect();
        if unresolved.is_empty() {
            unresolved = [a, b]
                .iter()
                .map(|probe| UnresolvedParticipant {
                    participant_id: probe.id.clone(),
                    reason: UnresolvedReason::NoComplementaryRole,
                })
                .collect();
        }
        DomainError::RolesUnresolved(unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BoxFuture;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StaticDirectory {
        users: HashMap<String, UserProfile>,
        vendors: HashMap<String, VendorProfile>,
    }

    impl StaticDirectory {
        fn with_user(mut self, id: &str) -> Self {
            self.users.insert(
                id.to_string(),
                UserProfile {
                    user_id: id.to_string(),
                    name: format!("{id}-name"),
                    image_url: Some(format!("https://img/{id}.png")),
                },
            );
            self
        }

        fn with_vendor(mut self, id: &str) -> Self {
            self.vendors.insert(
                id.to_string(),
                VendorProfile {
                    vendor_id: id.to_string(),
                    name: format!("{id}-travel"),
                    profile_image: None,
                },
            );
            self
        }
    }

    impl ParticipantDirectory for StaticDirectory {
        fn find_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
            let found = self.users.get(user_id).cloned();
            Box::pin(async move { Ok(found) })
        }

        fn find_vendor(
            &self,
            vendor_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<VendorProfile>>> {
            let found = self.vendors.get(vendor_id).cloned();
            Box::pin(async move { Ok(found) })
        }
    }

    fn resolver(directory: StaticDirectory) -> ParticipantResolver {
        ParticipantResolver::new(Arc::new(directory))
    }

    #[tokio::test]
    async fn resolves_roles_in_either_order() {
        let resolver = resolver(StaticDirectory::default().with_user("u1").with_vendor("v1"));

        let forward = resolver.resolve("u1", "v1").await.expect("forward");
        let reverse = resolver.resolve("v1", "u1").await.expect("reverse");

        assert_eq!(forward.pair, ParticipantPair::new("u1", "v1"));
        assert_eq!(reverse.pair, forward.pair);
        assert_eq!(reverse.vendor.name, "v1-travel");
    }

    #[tokio::test]
    async fn same_type_pair_is_rejected() {
        let resolver = resolver(StaticDirectory::default().with_user("u1").with_user("u2"));
        let err = resolver.resolve("u1", "u2").await.unwrap_err();
        assert!(matches!(err, DomainError::SameTypePair(ParticipantKind::User)));

        let resolver = resolver_with_vendors();
        let err = resolver.resolve("v1", "v2").await.unwrap_err();
        assert!(matches!(err, DomainError::SameTypePair(ParticipantKind::Vendor)));
    }

    fn resolver_with_vendors() -> ParticipantResolver {
        resolver(StaticDirectory::default().with_vendor("v1").with_vendor("v2"))
    }

    #[tokio::test]
    async fn unknown_participant_reports_which_id_failed() {
        let resolver = resolver(StaticDirectory::default().with_user("u1"));
        let err = resolver.resolve("u1", "ghost").await.unwrap_err();
        match err {
            DomainError::RolesUnresolved(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].participant_id, "ghost");
                assert_eq!(items[0].reason, UnresolvedReason::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn identical_ids_are_a_validation_error() {
        let resolver = resolver(StaticDirectory::default().with_user("u1"));
        let err = resolver.resolve("u1", "u1").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn card_normalizes_avatar_field_names() {
        let user = Participant::User(UserProfile {
            user_id: "u1".into(),
            name: "Ana".into(),
            image_url: Some("https://img/u1.png".into()),
        });
        let vendor = Participant::Vendor(VendorProfile {
            vendor_id: "v1".into(),
            name: "Blue Trips".into(),
            profile_image: Some("https://img/v1.png".into()),
        });

        assert_eq!(user.card().avatar_url.as_deref(), Some("https://img/u1.png"));
        assert_eq!(vendor.card().avatar_url.as_deref(), Some("https://img/v1.png"));
        assert_eq!(vendor.card().kind, ParticipantKind::Vendor);
    }

    #[test]
    fn pair_key_ignores_argument_order() {
        assert_eq!(pair_key("v1", "u1"), pair_key("u1", "v1"));
        assert_eq!(ParticipantPair::new("u1", "v1").pair_key(), "u1:v1");
    }

    #[test]
    fn kind_parse_normalizes_casing_and_builds_channels() {
        assert_eq!(ParticipantKind::parse("User"), Some(ParticipantKind::User));
        assert_eq!(ParticipantKind::parse(" VENDOR "), Some(ParticipantKind::Vendor));
        assert_eq!(ParticipantKind::parse("admin"), None);
        assert_eq!(ParticipantKind::Vendor.personal_channel("v1"), "vendor_v1");
        assert!(ParticipantKind::is_personal_channel("user_u1"));
        assert!(ParticipantKind::is_personal_channel("vendor_v1"));
        assert!(!ParticipantKind::is_personal_channel("0192a7c4e1f37d2b"));
        assert!(!ParticipantKind::is_personal_channel("users"));
    }
}
