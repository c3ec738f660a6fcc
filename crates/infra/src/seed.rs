use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tripmate_domain::participant::{UserProfile, VendorProfile};

use crate::repositories::{InMemoryBookingLedger, InMemoryParticipantDirectory};

/// Fixture for the memory backend: the users, vendors and confirmed
/// bookings a chat can be opened between.
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub vendors: Vec<VendorProfile>,
    #[serde(default)]
    pub bookings: Vec<SeedBooking>,
}

#[derive(Debug, Deserialize)]
pub struct SeedBooking {
    pub user_id: String,
    pub vendor_id: String,
}

impl MemorySeed {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("invalid memory seed")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read memory seed {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub async fn apply(
        self,
        directory: &InMemoryParticipantDirectory,
        bookings: &InMemoryBookingLedger,
    ) {
        let (users, vendors, confirmed) = (self.users.len(), self.vendors.len(), self.bookings.len());
        for user in self.users {
            directory.add_user(user).await;
        }
        for vendor in self.vendors {
            directory.add_vendor(vendor).await;
        }
        for booking in self.bookings {
            bookings.confirm(&booking.user_id, &booking.vendor_id).await;
        }
        tracing::info!(users, vendors, bookings = confirmed, "memory seed loaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripmate_domain::ports::booking::BookingLedger;
    use tripmate_domain::ports::participants::ParticipantDirectory;

    const FIXTURE: &str = r#"{
        "users": [{ "user_id": "u1", "name": "Ana", "image_url": null }],
        "vendors": [{ "vendor_id": "v1", "name": "Blue Trips", "profile_image": "https://img/v1.png" }],
        "bookings": [{ "user_id": "u1", "vendor_id": "v1" }]
    }"#;

    #[tokio::test]
    async fn seed_populates_directory_and_ledger() {
        let directory = InMemoryParticipantDirectory::new();
        let bookings = InMemoryBookingLedger::new();

        MemorySeed::from_json(FIXTURE)
            .unwrap()
            .apply(&directory, &bookings)
            .await;

        assert_eq!(directory.find_user("u1").await.unwrap().unwrap().name, "Ana");
        assert!(directory.find_vendor("v1").await.unwrap().is_some());
        assert!(bookings.has_confirmed_booking("u1", "v1").await.unwrap());
        assert!(!bookings.has_confirmed_booking("v1", "u1").await.unwrap());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let seed = MemorySeed::from_json(r#"{ "users": [] }"#).unwrap();
        assert!(seed.vendors.is_empty());
        assert!(seed.bookings.is_empty());
    }

    #[test]
    fn load_reports_unreadable_paths() {
        let err = MemorySeed::load("/nonexistent/tripmate-seed.json").unwrap_err();
        assert!(err.to_string().contains("failed to read memory seed"));
    }
}
