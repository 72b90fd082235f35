use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ChatError;

/// The two parties of a booking conversation: the customer who made the
/// booking and the vendor who owns the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingParties {
    pub booking_id: String,
    pub customer_id: String,
    pub vendor_id: String,
}

impl BookingParties {
    /// Resolves the receiver of a message: whichever party is not the
    /// sender. A sender who is neither party fails resolution.
    pub fn counterpart(&self, user_id: &str) -> Result<&str, ChatError> {
        if user_id == self.customer_id {
            Ok(&self.vendor_id)
        } else if user_id == self.vendor_id {
            Ok(&self.customer_id)
        } else {
            Err(ChatError::NoCounterpart {
                booking_id: self.booking_id.clone(),
                user_id: user_id.to_string(),
            })
        }
    }
}

/// Lookup of booking parties. The booking CRUD system is an external
/// collaborator; this trait is the seam it is consumed through.
#[async_trait]
pub trait BookingDirectory: Send + Sync {
    async fn parties(&self, booking_id: &str) -> Option<BookingParties>;
}

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    bookings: Arc<RwLock<HashMap<String, BookingParties>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, parties: BookingParties) {
        let mut bookings = self.bookings.write().await;
        bookings.insert(parties.booking_id.clone(), parties);
    }
}

#[async_trait]
impl BookingDirectory for InMemoryDirectory {
    async fn parties(&self, booking_id: &str) -> Option<BookingParties> {
        let bookings = self.bookings.read().await;
        bookings.get(booking_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties() -> BookingParties {
        BookingParties {
            booking_id: "b1".to_string(),
            customer_id: "u1".to_string(),
            vendor_id: "u2".to_string(),
        }
    }

    #[test]
    fn counterpart_resolves_both_directions() {
        let p = parties();
        assert_eq!(p.counterpart("u1").unwrap(), "u2");
        assert_eq!(p.counterpart("u2").unwrap(), "u1");
    }

    #[test]
    fn counterpart_rejects_third_party() {
        let p = parties();
        let err = p.counterpart("u3").unwrap_err();
        assert!(matches!(err, ChatError::NoCounterpart { .. }));
    }

    #[tokio::test]
    async fn directory_lookup() {
        let dir = InMemoryDirectory::new();
        dir.insert(parties()).await;
        assert_eq!(dir.parties("b1").await, Some(parties()));
        assert!(dir.parties("b2").await.is_none());
    }
}
