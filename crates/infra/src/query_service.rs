//! The query core: user-facing ticket reads over the read store, fronted by
//! the short-TTL cache.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use faregate_booking::BookingStatus;
use faregate_core::{BookingId, DomainError, UserId};

use crate::cache::{
    ticket_key, user_tickets_key, TicketCache, TICKET_DETAIL_TTL, USER_TICKETS_TTL,
};
use crate::read_store::{ReadStore, ReadStoreError, TicketPage, TicketView};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<ReadStoreError> for QueryError {
    fn from(value: ReadStoreError) -> Self {
        match value {
            ReadStoreError::Unavailable(msg) | ReadStoreError::Corrupt(msg) => {
                QueryError::Unavailable(msg)
            }
        }
    }
}

pub struct QueryService {
    read: Arc<dyn ReadStore>,
    cache: Arc<dyn TicketCache>,
}

impl QueryService {
    pub fn new(read: Arc<dyn ReadStore>, cache: Arc<dyn TicketCache>) -> Self {
        Self { read, cache }
    }

    /// List a user's tickets, newest first.
    ///
    /// Unfiltered pages are served read-through the cache (60 s TTL); a
    /// status filter always bypasses it.
    pub async fn my_tickets(
        &self,
        user_id: &UserId,
        status: Option<BookingStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TicketPage, QueryError> {
        if page < 1 {
            return Err(DomainError::bad_request("page must be at least 1").into());
        }
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        if status.is_some() {
            return Ok(self
                .read
                .list_user_tickets(user_id, status, page, limit)
                .await?);
        }

        let key = user_tickets_key(user_id, page, limit);
        if let Some(value) = self.cache.get(&key).await {
            match serde_json::from_value::<TicketPage>(value) {
                Ok(cached) => return Ok(cached),
                Err(error) => debug!(key, %error, "ignoring malformed cache entry"),
            }
        }

        let result = self
            .read
            .list_user_tickets(user_id, None, page, limit)
            .await?;

        if let Ok(value) = serde_json::to_value(&result) {
            self.cache.set(&key, value, USER_TICKETS_TTL).await;
        }

        Ok(result)
    }

    /// Fetch one ticket, enforcing ownership. On a cache hit the ownership
    /// check runs against the cached row before anything is returned.
    pub async fn ticket(
        &self,
        booking_id: BookingId,
        requester: &UserId,
    ) -> Result<TicketView, QueryError> {
        let key = ticket_key(booking_id);

        if let Some(value) = self.cache.get(&key).await {
            match serde_json::from_value::<TicketView>(value) {
                Ok(view) => {
                    if &view.user_id != requester {
                        return Err(DomainError::forbidden(
                            "ticket belongs to a different user",
                        )
                        .into());
                    }
                    return Ok(view);
                }
                Err(error) => debug!(key, %error, "ignoring malformed cache entry"),
            }
        }

        let view = self
            .read
            .get_ticket(booking_id)
            .await?
            .ok_or(DomainError::NotFound)?;

        if &view.user_id != requester {
            return Err(DomainError::forbidden("ticket belongs to a different user").into());
        }

        if let Ok(value) = serde_json::to_value(&view) {
            self.cache.set(&key, value, TICKET_DETAIL_TTL).await;
        }

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use faregate_core::{Currency, Money, RouteId, ScheduleId};

    use crate::cache::InMemoryCache;
    use crate::read_store::InMemoryReadStore;

    fn view(user: &str, created_offset_minutes: i64, status: BookingStatus) -> TicketView {
        let at = Utc::now() - Duration::minutes(created_offset_minutes);
        TicketView {
            booking_id: BookingId::new(),
            user_id: UserId::from(user),
            route_id: RouteId::from("R1"),
            schedule_id: ScheduleId::from("S1"),
            seat_number: None,
            passenger_name: "Ada Passenger".to_string(),
            passenger_email: "ada@example.com".to_string(),
            price: Money::new(dec!(25.00)),
            currency: Currency::usd(),
            status,
            route_name: None,
            departure_time: None,
            arrival_time: None,
            origin_stop: None,
            destination_stop: None,
            created_at: at,
            updated_at: at,
        }
    }

    async fn fixture_with(views: Vec<TicketView>) -> (QueryService, Arc<InMemoryReadStore>, Arc<InMemoryCache>) {
        let read = Arc::new(InMemoryReadStore::new());
        let cache = Arc::new(InMemoryCache::new());
        for v in &views {
            read.upsert_ticket(v).await.unwrap();
        }
        (
            QueryService::new(read.clone(), cache.clone()),
            read,
            cache,
        )
    }

    #[tokio::test]
    async fn lists_newest_first_with_pagination_math() {
        let views: Vec<TicketView> = (0..25)
            .map(|i| view("U1", i, BookingStatus::Pending))
            .collect();
        let newest = views[0].booking_id;
        let (service, _, _) = fixture_with(views).await;

        let page = service
            .my_tickets(&UserId::from("U1"), None, 1, 10)
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.data.len(), 10);
        assert_eq!(page.data[0].booking_id, newest);
        assert_eq!(page.total_pages(), 3);

        let last = service
            .my_tickets(&UserId::from("U1"), None, 3, 10)
            .await
            .unwrap();
        assert_eq!(last.data.len(), 5);
    }

    #[tokio::test]
    async fn page_zero_is_rejected_and_limit_is_clamped() {
        let (service, _, _) = fixture_with(vec![]).await;

        let err = service
            .my_tickets(&UserId::from("U1"), None, 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Domain(DomainError::BadRequest(_))));

        let page = service
            .my_tickets(&UserId::from("U1"), None, 1, 500)
            .await
            .unwrap();
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn unfiltered_list_is_cached_and_filtered_list_bypasses() {
        let (service, _, cache) = fixture_with(vec![
            view("U1", 1, BookingStatus::Pending),
            view("U1", 2, BookingStatus::Confirmed),
        ])
        .await;

        service
            .my_tickets(&UserId::from("U1"), None, 1, 10)
            .await
            .unwrap();
        assert!(cache.contains(&user_tickets_key(&UserId::from("U1"), 1, 10)));

        let filtered = service
            .my_tickets(&UserId::from("U1"), Some(BookingStatus::Confirmed), 1, 10)
            .await
            .unwrap();
        assert_eq!(filtered.total, 1);
        // No extra cache entries appear for filtered queries.
        assert!(!cache.contains(&user_tickets_key(&UserId::from("U1"), 1, 100)));
    }

    #[tokio::test]
    async fn cached_page_is_served_without_hitting_the_store() {
        let (service, read, _) = fixture_with(vec![view("U1", 1, BookingStatus::Pending)]).await;

        let first = service
            .my_tickets(&UserId::from("U1"), None, 1, 10)
            .await
            .unwrap();

        // Mutate the store after the page was cached; the cached snapshot
        // still wins until it expires or is invalidated.
        read.upsert_ticket(&view("U1", 0, BookingStatus::Pending))
            .await
            .unwrap();

        let second = service
            .my_tickets(&UserId::from("U1"), None, 1, 10)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ticket_detail_enforces_ownership_and_caches() {
        let v = view("U1", 1, BookingStatus::Pending);
        let id = v.booking_id;
        let (service, _, cache) = fixture_with(vec![v.clone()]).await;

        let got = service.ticket(id, &UserId::from("U1")).await.unwrap();
        assert_eq!(got, v);
        assert!(cache.contains(&ticket_key(id)));

        // Ownership is re-checked against the cached row.
        let err = service.ticket(id, &UserId::from("U2")).await.unwrap_err();
        assert!(matches!(err, QueryError::Domain(DomainError::Forbidden(_))));
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let (service, _, _) = fixture_with(vec![]).await;
        let err = service
            .ticket(BookingId::new(), &UserId::from("U1"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Domain(DomainError::NotFound)));
    }
}
