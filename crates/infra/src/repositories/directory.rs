use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use tokio::sync::RwLock;
use tripmate_domain::DomainResult;
use tripmate_domain::participant::{UserProfile, VendorProfile};
use tripmate_domain::ports::BoxFuture;
use tripmate_domain::ports::booking::BookingLedger;
use tripmate_domain::ports::participants::ParticipantDirectory;

use super::{decode_rows, decode_total, map_surreal_error, take_rows};

/// Seedable stand-in for the user and vendor collections.
#[derive(Default)]
pub struct InMemoryParticipantDirectory {
    users: Arc<RwLock<HashMap<String, UserProfile>>>,
    vendors: Arc<RwLock<HashMap<String, VendorProfile>>>,
}

impl InMemoryParticipantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, profile: UserProfile) {
        self.users
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }

    pub async fn add_vendor(&self, profile: VendorProfile) {
        self.vendors
            .write()
            .await
            .insert(profile.vendor_id.clone(), profile);
    }
}

impl ParticipantDirectory for InMemoryParticipantDirectory {
    fn find_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        let users = self.users.clone();
        Box::pin(async move { Ok(users.read().await.get(&user_id).cloned()) })
    }

    fn find_vendor(&self, vendor_id: &str) -> BoxFuture<'_, DomainResult<Option<VendorProfile>>> {
        let vendor_id = vendor_id.to_string();
        let vendors = self.vendors.clone();
        Box::pin(async move { Ok(vendors.read().await.get(&vendor_id).cloned()) })
    }
}

/// Confirmed bookings keyed by `(user_id, vendor_id)`.
#[derive(Default)]
pub struct InMemoryBookingLedger {
    confirmed: Arc<RwLock<HashSet<(String, String)>>>,
}

impl InMemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn confirm(&self, user_id: &str, vendor_id: &str) {
        self.confirmed
            .write()
            .await
            .insert((user_id.to_string(), vendor_id.to_string()));
    }
}

impl BookingLedger for InMemoryBookingLedger {
    fn has_confirmed_booking(&self, party_a: &str, party_b: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let key = (party_a.to_string(), party_b.to_string());
        let confirmed = self.confirmed.clone();
        Box::pin(async move { Ok(confirmed.read().await.contains(&key)) })
    }
}

#[derive(Debug, Deserialize)]
struct SurrealUserRow {
    user_id: String,
    name: Option<String>,
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SurrealVendorRow {
    vendor_id: String,
    name: Option<String>,
    profile_image: Option<String>,
}

pub struct SurrealParticipantDirectory {
    client: Arc<Surreal<Client>>,
}

impl SurrealParticipantDirectory {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }
}

impl ParticipantDirectory for SurrealParticipantDirectory {
    fn find_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query("SELECT user_id, name, image_url FROM app_user WHERE user_id = $user_id LIMIT 1")
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = decode_rows::<SurrealUserRow>(take_rows(&mut response)?, "user")?;
            Ok(rows.into_iter().next().map(|row| UserProfile {
                user_id: row.user_id,
                name: row.name.unwrap_or_default(),
                image_url: row.image_url,
            }))
        })
    }

    fn find_vendor(&self, vendor_id: &str) -> BoxFuture<'_, DomainResult<Option<VendorProfile>>> {
        let vendor_id = vendor_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT vendor_id, name, profile_image FROM vendor \
                     WHERE vendor_id = $vendor_id LIMIT 1",
                )
                .bind(("vendor_id", vendor_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = decode_rows::<SurrealVendorRow>(take_rows(&mut response)?, "vendor")?;
            Ok(rows.into_iter().next().map(|row| VendorProfile {
                vendor_id: row.vendor_id,
                name: row.name.unwrap_or_default(),
                profile_image: row.profile_image,
            }))
        })
    }
}

pub struct SurrealBookingLedger {
    client: Arc<Surreal<Client>>,
}

impl SurrealBookingLedger {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }
}

impl BookingLedger for SurrealBookingLedger {
    fn has_confirmed_booking(&self, party_a: &str, party_b: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let user_id = party_a.to_string();
        let vendor_id = party_b.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT count() AS total FROM booking \
                     WHERE user_id = $user_id AND vendor_id = $vendor_id AND status = 'confirmed' \
                     GROUP ALL",
                )
                .bind(("user_id", user_id))
                .bind(("vendor_id", vendor_id))
                .await
                .map_err(map_surreal_error)?;
            Ok(decode_total(take_rows(&mut response)?) > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn booking_is_directional() {
        let ledger = InMemoryBookingLedger::new();
        ledger.confirm("u1", "v1").await;

        assert!(ledger.has_confirmed_booking("u1", "v1").await.unwrap());
        assert!(!ledger.has_confirmed_booking("v1", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn directory_keeps_stores_disjoint() {
        let directory = InMemoryParticipantDirectory::new();
        directory
            .add_vendor(VendorProfile {
                vendor_id: "v1".into(),
                name: "Blue Trips".into(),
                profile_image: None,
            })
            .await;

        assert!(directory.find_user("v1").await.unwrap().is_none());
        assert_eq!(
            directory.find_vendor("v1").await.unwrap().map(|v| v.name),
            Some("Blue Trips".to_string())
        );
    }
}
