use crate::DomainResult;
use crate::participant::{UserProfile, VendorProfile};

/// Read access to the two disjoint identity stores.
pub trait ParticipantDirectory: Send + Sync {
    fn find_user(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;

    fn find_vendor(
        &self,
        vendor_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<VendorProfile>>>;
}
