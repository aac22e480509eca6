use crate::domain::conversation::ParticipantPair;
use crate::domain::listing::Listing;
use crate::domain::notification::ConversationEvent;
use crate::domain::offer::{self, NewOffer, Offer, OfferFilter, OfferStatus};
use crate::domain::page::Page;
use crate::error::{AppError, Result};
use crate::services::notification::ChangeNotifier;
use crate::services::ports::{ConversationStore, ListingCatalog, OfferStore};
use opentelemetry::{KeyValue, global, metrics::Counter};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    transitions_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            transitions_total: meter
                .u64_counter("bazaar_offer_transitions_total")
                .with_description("Offers opened and decided, by resulting status")
                .build(),
        }
    }
}

/// Standalone offers against listings: `pending`, then `accepted` or `rejected`.
#[derive(Clone, Debug)]
pub struct OfferService {
    offers: Arc<dyn OfferStore>,
    listings: Arc<dyn ListingCatalog>,
    conversations: Arc<dyn ConversationStore>,
    notifier: Arc<dyn ChangeNotifier>,
    metrics: Metrics,
}

impl OfferService {
    #[must_use]
    pub fn new(
        offers: Arc<dyn OfferStore>,
        listings: Arc<dyn ListingCatalog>,
        conversations: Arc<dyn ConversationStore>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self { offers, listings, conversations, notifier, metrics: Metrics::new() }
    }

    async fn listing(&self, listing_id: &str) -> Result<Listing> {
        self.listings.get_listing(listing_id).await?.ok_or(AppError::NotFound)
    }

    /// Opens a pending offer.
    ///
    /// # Errors
    /// Returns `AppError::InvalidArgument` for a negative price, a blank
    /// offerer, or an owner bidding on their own listing.
    /// Returns `AppError::NotFound` if the listing does not exist.
    #[tracing::instrument(err(level = "debug"), skip(self, message))]
    pub async fn open(
        &self,
        listing_id: &str,
        offerer_id: &str,
        message: Option<String>,
        price: Option<Decimal>,
    ) -> Result<Offer> {
        offer::validate_price(price)?;
        if offerer_id.trim().is_empty() {
            return Err(AppError::invalid("offerer id must not be empty"));
        }

        let listing = self.listing(listing_id).await?;
        if listing.owner_id == offerer_id {
            return Err(AppError::invalid("cannot make an offer on your own listing"));
        }

        let opened = self
            .offers
            .insert(NewOffer {
                listing_id: listing.id.clone(),
                offerer_id: offerer_id.to_string(),
                message: message.filter(|m| !m.trim().is_empty()),
                price,
            })
            .await?;

        tracing::info!(offer_id = %opened.id, "Offer opened");
        self.metrics.transitions_total.add(1, &[KeyValue::new("status", opened.status.as_str())]);
        self.report(&listing, &opened).await;
        Ok(opened)
    }

    /// Newest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn list(&self, filter: &OfferFilter, page: Page) -> Result<Vec<Offer>> {
        self.offers.list(filter, page).await
    }

    /// Moves an offer to `next` on behalf of the listing owner.
    ///
    /// Re-applying the current status returns the offer unchanged. The write is
    /// a compare-and-set on the status that was read, so two concurrent
    /// deciders cannot both win; the loser re-reads and gets
    /// `InvalidTransition` (or a no-op if it asked for the same outcome).
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the offer or its listing is absent.
    /// Returns `AppError::Forbidden` if `requester` does not own the listing.
    /// Returns `AppError::InvalidTransition` when leaving a terminal status.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn set_status(&self, offer_id: Uuid, requester: &str, next: OfferStatus) -> Result<Offer> {
        loop {
            let current = self.offers.get(offer_id).await?.ok_or(AppError::NotFound)?;
            let listing = self.listing(&current.listing_id).await?;
            if listing.owner_id != requester {
                return Err(AppError::Forbidden);
            }

            current.status.transition_to(next)?;
            if current.status == next {
                tracing::debug!(status = %next, "Offer already in requested status");
                return Ok(current);
            }

            if let Some(updated) = self.offers.update_status(offer_id, current.status, next).await? {
                tracing::info!(from = %current.status, to = %next, "Offer status changed");
                self.metrics.transitions_total.add(1, &[KeyValue::new("status", next.as_str())]);
                self.report(&listing, &updated).await;
                return Ok(updated);
            }

            tracing::debug!("Offer status changed concurrently, re-reading");
        }
    }

    /// Tells both parties about the offer over their existing conversation, if any.
    async fn report(&self, listing: &Listing, offer: &Offer) {
        let Ok(pair) = ParticipantPair::new(&offer.offerer_id, &listing.owner_id) else {
            return;
        };

        match self.conversations.find_by_pair(&pair).await {
            Ok(Some(conversation)) => {
                self.notifier.publish(conversation.id, ConversationEvent::OfferUpdated { offer: offer.clone() }).await;
            }
            Ok(None) => tracing::debug!(offer_id = %offer.id, "No conversation between offer parties yet"),
            Err(e) => tracing::warn!(error = %e, offer_id = %offer.id, "Failed to resolve conversation for offer update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::config::NotificationConfig;
    use crate::services::notification::LocalChangeNotifier;

    struct Fixture {
        service: OfferService,
        store: Arc<MemoryStore>,
        notifier: Arc<LocalChangeNotifier>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store
            .put_listing(Listing { id: "l1".into(), title: "Bike".into(), image: None, owner_id: "seller".into() })
            .expect("listing");
        let notifier = Arc::new(LocalChangeNotifier::new(&NotificationConfig::default()));
        let service = OfferService::new(
            Arc::clone(&store) as Arc<dyn OfferStore>,
            Arc::clone(&store) as Arc<dyn ListingCatalog>,
            Arc::clone(&store) as Arc<dyn ConversationStore>,
            Arc::clone(&notifier) as Arc<dyn ChangeNotifier>,
        );
        Fixture { service, store, notifier }
    }

    #[tokio::test]
    async fn test_negative_price_rejected_then_valid_offer_accepted() {
        let f = fixture();

        let negative = f.service.open("l1", "buyer", None, Some(Decimal::new(-5, 0))).await;
        assert!(matches!(negative, Err(AppError::InvalidArgument(_))));

        let opened = f.service.open("l1", "buyer", Some("still available?".into()), Some(Decimal::new(5, 0))).await;
        let opened = opened.expect("open");
        assert_eq!(opened.status, OfferStatus::Pending);

        let accepted = f.service.set_status(opened.id, "seller", OfferStatus::Accepted).await.expect("accept");
        assert_eq!(accepted.status, OfferStatus::Accepted);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final_and_reapply_is_noop() {
        let f = fixture();
        let opened = f.service.open("l1", "buyer", None, None).await.expect("open");
        let rejected = f.service.set_status(opened.id, "seller", OfferStatus::Rejected).await.expect("reject");

        let again = f.service.set_status(opened.id, "seller", OfferStatus::Rejected).await.expect("no-op");
        assert_eq!(again, rejected);

        for next in [OfferStatus::Accepted, OfferStatus::Pending] {
            let result = f.service.set_status(opened.id, "seller", next).await;
            assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
        }
    }

    #[tokio::test]
    async fn test_only_owner_decides() {
        let f = fixture();
        let opened = f.service.open("l1", "buyer", None, None).await.expect("open");

        let by_buyer = f.service.set_status(opened.id, "buyer", OfferStatus::Accepted).await;
        assert!(matches!(by_buyer, Err(AppError::Forbidden)));

        let missing = f.service.set_status(Uuid::new_v4(), "seller", OfferStatus::Accepted).await;
        assert!(matches!(missing, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_listing_and_self_offer() {
        let f = fixture();
        assert!(matches!(f.service.open("nope", "buyer", None, None).await, Err(AppError::NotFound)));
        assert!(matches!(f.service.open("l1", "seller", None, None).await, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_concurrent_deciders_have_one_winner() {
        let f = fixture();
        let opened = f.service.open("l1", "buyer", None, None).await.expect("open");

        let accept = f.service.set_status(opened.id, "seller", OfferStatus::Accepted);
        let reject = f.service.set_status(opened.id, "seller", OfferStatus::Rejected);
        let (a, r) = tokio::join!(accept, reject);

        assert!(a.is_ok() != r.is_ok(), "exactly one decision must win");
        let stored = OfferStore::get(f.store.as_ref(), opened.id).await.expect("get").expect("offer");
        assert!(stored.status.is_terminal());
    }

    #[tokio::test]
    async fn test_list_filters_newest_first() {
        let f = fixture();
        f.store
            .put_listing(Listing { id: "l2".into(), title: "Lamp".into(), image: None, owner_id: "seller".into() })
            .expect("listing");

        let first = f.service.open("l1", "buyer", None, None).await.expect("open");
        let second = f.service.open("l1", "other", None, None).await.expect("open");
        f.service.open("l2", "buyer", None, None).await.expect("open");

        let on_l1 = f
            .service
            .list(&OfferFilter { listing_id: Some("l1".into()), offerer_id: None }, Page::default())
            .await
            .expect("list");
        assert_eq!(on_l1.iter().map(|o| o.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let by_buyer = f
            .service
            .list(&OfferFilter { listing_id: None, offerer_id: Some("buyer".into()) }, Page::default())
            .await
            .expect("list");
        assert_eq!(by_buyer.len(), 2);
    }

    #[tokio::test]
    async fn test_status_change_reaches_existing_conversation() {
        let f = fixture();
        let pair = ParticipantPair::new("buyer", "seller").expect("pair");
        let conversation = ConversationStore::insert(f.store.as_ref(), &pair).await.expect("conversation");
        let mut rx = f.notifier.subscribe(conversation.id).await;

        let opened = f.service.open("l1", "buyer", None, None).await.expect("open");
        f.service.set_status(opened.id, "seller", OfferStatus::Accepted).await.expect("accept");

        let statuses: Vec<OfferStatus> = [rx.recv().await.expect("opened"), rx.recv().await.expect("accepted")]
            .into_iter()
            .map(|event| match event {
                ConversationEvent::OfferUpdated { offer } => offer.status,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(statuses, vec![OfferStatus::Pending, OfferStatus::Accepted]);
    }
}
