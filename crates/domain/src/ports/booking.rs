use crate::DomainResult;

pub trait BookingLedger: Send + Sync {
    /// Whether `party_a` holds a confirmed booking with `party_b`, reading
    /// `party_a` as the booking user and `party_b` as the vendor.
    fn has_confirmed_booking(
        &self,
        party_a: &str,
        party_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;
}
