use std::sync::Arc;

use chrono::{DateTime, Utc};
use tonic::{Request, Response, Status};

use crate::error::AppError;
use crate::models::{Coordinates, Item, ItemDetails, ItemDraft, ItemPatch, ItemStatus, ItemType};
use crate::proto::common::Empty;
use crate::proto::items::items_service_server::ItemsService;
use crate::proto::items::{
    CreateItemReq, CreateItemRes, DeleteItemReq, GetItemReq, GetItemRes, Item as ItemMessage,
    ListItemsByCategoryReq, ListItemsByTypeReq, ListItemsRes, ListNearbyItemsReq, SearchItemsReq,
    SearchItemsRes, UpdateItemReq, UpdateItemRes, UpdateItemStatusReq, UpdateItemStatusRes,
};
use crate::store::{ItemFilter, ItemStore, PageRequest, Proximity, Sort};

/// Metadata key carrying the trusted caller id. Verification happens
/// upstream; this layer only reads the value.
pub const USER_ID_METADATA_KEY: &str = "x-user-id";

/// Search radius applied when a nearby lookup does not supply one, in meters.
const DEFAULT_NEARBY_RADIUS_M: f64 = 5000.0;

pub struct ItemsServiceImpl {
    store: Arc<dyn ItemStore>,
}

impl ItemsServiceImpl {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    fn caller_user_id<T>(request: &Request<T>) -> Result<i64, Status> {
        let value = request
            .metadata()
            .get(USER_ID_METADATA_KEY)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Status::unauthenticated("x-user-id metadata is required"))?;
        value
            .parse::<i64>()
            .map_err(|_| Status::invalid_argument("x-user-id must be a numeric user id"))
    }

    fn model_to_proto(item: &Item) -> ItemMessage {
        ItemMessage {
            id: item.id.clone(),
            user_id: item.user_id,
            organization_id: item.organization_id,
            item_type: item.item_type.to_string(),
            status: item.status.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            category: item.category.clone(),
            location: item.location.clone(),
            longitude: item.coordinates.map(|c| c.longitude),
            latitude: item.coordinates.map(|c| c.latitude),
            date_lost_found: item
                .date_lost_found
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            date_reported: item.date_reported.to_rfc3339(),
            images: item.images.clone(),
            tags: item.tags.clone(),
            contact_email: item.contact_email.clone().unwrap_or_default(),
            contact_phone: item.contact_phone.clone().unwrap_or_default(),
            preferred_contact: item.preferred_contact.clone().unwrap_or_default(),
            reward: item.reward,
            created_at: item.created_at.to_rfc3339(),
            updated_at: item.updated_at.to_rfc3339(),
        }
    }

    fn parse_timestamp(field: &str, value: &str) -> Result<Option<DateTime<Utc>>, Status> {
        if value.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(value)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| {
                Status::invalid_argument(format!("{} must be an RFC 3339 timestamp", field))
            })
    }

    fn optional(value: String) -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    async fn require_item(&self, id: &str) -> Result<Item, Status> {
        let item = self
            .store
            .find_by_id(id)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| AppError::NotFound(format!("Item not found with id: {}", id)))?;
        Ok(item)
    }
}

#[tonic::async_trait]
impl ItemsService for ItemsServiceImpl {
    async fn create_item(
        &self,
        request: Request<CreateItemReq>,
    ) -> Result<Response<CreateItemRes>, Status> {
        let user_id = Self::caller_user_id(&request)?;
        let req = request.into_inner();

        if req.title.is_empty() {
            return Err(Status::invalid_argument("title is required"));
        }
        let item_type: ItemType = req.item_type.parse()?;
        let date_lost_found = Self::parse_timestamp("date_lost_found", &req.date_lost_found)?;

        let draft = ItemDraft {
            user_id,
            organization_id: req.organization_id,
            item_type,
            title: req.title,
            description: req.description,
            category: req.category,
            location: req.location,
            coordinates: Coordinates::from_parts(req.longitude, req.latitude),
            date_lost_found,
            images: req.images,
            tags: req.tags,
            contact_email: Self::optional(req.contact_email),
            contact_phone: Self::optional(req.contact_phone),
            preferred_contact: Self::optional(req.preferred_contact),
            reward: req.reward,
        };

        let item = self.store.insert(draft).await?;
        tracing::debug!(item_id = %item.id, user_id, "item created");

        Ok(Response::new(CreateItemRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn get_item(&self, request: Request<GetItemReq>) -> Result<Response<GetItemRes>, Status> {
        let req = request.into_inner();

        if req.id.is_empty() {
            return Err(Status::invalid_argument("id is required"));
        }

        let item = self.require_item(&req.id).await?;
        Ok(Response::new(GetItemRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn list_user_items(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<ListItemsRes>, Status> {
        let user_id = Self::caller_user_id(&request)?;

        let filter = ItemFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        let items = self.store.find(&filter, Sort::Unsorted).await?;

        Ok(Response::new(ListItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn search_items(
        &self,
        request: Request<SearchItemsReq>,
    ) -> Result<Response<SearchItemsRes>, Status> {
        let req = request.into_inner();

        let item_type = match req.item_type.as_str() {
            "" => None,
            s => Some(s.parse::<ItemType>()?),
        };
        let page = PageRequest::from_raw(req.page, req.size);

        // Two mutually exclusive modes: free-text search over ACTIVE items,
        // or browsing recent ACTIVE reports of one kind. Browsing without an
        // explicit kind defaults to LOST.
        let (filter, sort) = if req.q.is_empty() {
            (
                ItemFilter {
                    item_type: Some(item_type.unwrap_or(ItemType::Lost)),
                    status: Some(ItemStatus::Active),
                    ..Default::default()
                },
                Sort::ByDateReportedDesc,
            )
        } else {
            (
                ItemFilter {
                    term: Some(req.q),
                    item_type,
                    status: Some(ItemStatus::Active),
                    ..Default::default()
                },
                Sort::ById,
            )
        };

        let (items, total) = self.store.find_page(&filter, sort, page).await?;

        Ok(Response::new(SearchItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
            page: page.page as i32,
            size: page.size as i32,
            total: total as i64,
        }))
    }

    async fn list_items_by_type(
        &self,
        request: Request<ListItemsByTypeReq>,
    ) -> Result<Response<ListItemsRes>, Status> {
        let req = request.into_inner();
        let item_type: ItemType = req.item_type.parse()?;

        let filter = ItemFilter {
            item_type: Some(item_type),
            ..Default::default()
        };
        let items = self.store.find(&filter, Sort::Unsorted).await?;

        Ok(Response::new(ListItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn list_items_by_category(
        &self,
        request: Request<ListItemsByCategoryReq>,
    ) -> Result<Response<ListItemsRes>, Status> {
        let req = request.into_inner();

        if req.category.is_empty() {
            return Err(Status::invalid_argument("category is required"));
        }

        let filter = ItemFilter {
            category: Some(req.category),
            ..Default::default()
        };
        let items = self.store.find(&filter, Sort::Unsorted).await?;

        Ok(Response::new(ListItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn list_nearby_items(
        &self,
        request: Request<ListNearbyItemsReq>,
    ) -> Result<Response<ListItemsRes>, Status> {
        let req = request.into_inner();

        if !(-180.0..=180.0).contains(&req.longitude) {
            return Err(Status::invalid_argument(
                "longitude must be between -180 and 180",
            ));
        }
        if !(-90.0..=90.0).contains(&req.latitude) {
            return Err(Status::invalid_argument(
                "latitude must be between -90 and 90",
            ));
        }
        let radius_m = req.radius.unwrap_or(DEFAULT_NEARBY_RADIUS_M);
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(Status::invalid_argument("radius must not be negative"));
        }

        let filter = ItemFilter {
            near: Some(Proximity {
                center: Coordinates {
                    longitude: req.longitude,
                    latitude: req.latitude,
                },
                radius_m,
            }),
            ..Default::default()
        };
        let items = self.store.find(&filter, Sort::Unsorted).await?;

        Ok(Response::new(ListItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn update_item(
        &self,
        request: Request<UpdateItemReq>,
    ) -> Result<Response<UpdateItemRes>, Status> {
        let req = request.into_inner();

        if req.id.is_empty() {
            return Err(Status::invalid_argument("id is required"));
        }
        let date_lost_found = Self::parse_timestamp("date_lost_found", &req.date_lost_found)?;

        let details = ItemDetails {
            title: req.title,
            description: req.description,
            category: req.category,
            location: req.location,
            date_lost_found,
            images: req.images,
            tags: req.tags,
            contact_email: Self::optional(req.contact_email),
            contact_phone: Self::optional(req.contact_phone),
            preferred_contact: Self::optional(req.preferred_contact),
            reward: req.reward,
        };
        let patch = ItemPatch {
            details: Some(details),
            // an incomplete pair leaves the stored position untouched
            coordinates: Coordinates::from_parts(req.longitude, req.latitude),
            status: None,
        };

        let item = self
            .store
            .update(&req.id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item not found with id: {}", req.id)))?;

        Ok(Response::new(UpdateItemRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn update_item_status(
        &self,
        request: Request<UpdateItemStatusReq>,
    ) -> Result<Response<UpdateItemStatusRes>, Status> {
        let req = request.into_inner();

        if req.id.is_empty() {
            return Err(Status::invalid_argument("id is required"));
        }
        // validate before touching the store so a bad value changes nothing
        let status: ItemStatus = req.status.parse()?;

        let patch = ItemPatch {
            status: Some(status),
            ..Default::default()
        };
        let item = self
            .store
            .update(&req.id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item not found with id: {}", req.id)))?;

        tracing::debug!(item_id = %item.id, status = %item.status, "item status updated");

        Ok(Response::new(UpdateItemStatusRes {
            item: Some(Self::model_to_proto(&item)),
        }))
    }

    async fn delete_item(
        &self,
        request: Request<DeleteItemReq>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();

        if req.id.is_empty() {
            return Err(Status::invalid_argument("id is required"));
        }

        if !self.store.delete(&req.id).await? {
            return Err(AppError::NotFound(format!("Item not found with id: {}", req.id)).into());
        }

        Ok(Response::new(Empty {}))
    }

    async fn list_all_items(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ListItemsRes>, Status> {
        let items = self
            .store
            .find(&ItemFilter::default(), Sort::Unsorted)
            .await?;

        Ok(Response::new(ListItemsRes {
            items: items.iter().map(Self::model_to_proto).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tonic::Code;

    use super::*;
    use crate::store::MemoryItemStore;

    fn service() -> ItemsServiceImpl {
        ItemsServiceImpl::new(Arc::new(MemoryItemStore::new()))
    }

    fn as_user<T>(user_id: i64, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request
            .metadata_mut()
            .insert(USER_ID_METADATA_KEY, user_id.to_string().parse().unwrap());
        request
    }

    fn new_item(item_type: &str, title: &str) -> CreateItemReq {
        CreateItemReq {
            item_type: item_type.to_string(),
            title: title.to_string(),
            description: "left on the train".to_string(),
            category: "Accessories".to_string(),
            location: "Shinjuku station".to_string(),
            longitude: None,
            latitude: None,
            date_lost_found: "2026-08-01T09:30:00Z".to_string(),
            images: vec!["img-1".to_string()],
            tags: vec!["leather".to_string()],
            contact_email: "owner@example.com".to_string(),
            contact_phone: String::new(),
            preferred_contact: "email".to_string(),
            reward: Some(20.0),
            organization_id: None,
        }
    }

    async fn create(service: &ItemsServiceImpl, user_id: i64, req: CreateItemReq) -> ItemMessage {
        service
            .create_item(as_user(user_id, req))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap()
    }

    async fn get(service: &ItemsServiceImpl, id: &str) -> ItemMessage {
        service
            .get_item(Request::new(GetItemReq { id: id.to_string() }))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap()
    }

    async fn set_status(service: &ItemsServiceImpl, id: &str, status: &str) -> ItemMessage {
        service
            .update_item_status(Request::new(UpdateItemStatusReq {
                id: id.to_string(),
                status: status.to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap()
    }

    fn update_req(id: &str) -> UpdateItemReq {
        UpdateItemReq {
            id: id.to_string(),
            title: "Black Wallet".to_string(),
            description: "now with serial number".to_string(),
            category: "Accessories".to_string(),
            location: "Shibuya".to_string(),
            longitude: None,
            latitude: None,
            date_lost_found: String::new(),
            images: Vec::new(),
            tags: vec!["leather".to_string(), "bifold".to_string()],
            contact_email: "owner@example.com".to_string(),
            contact_phone: String::new(),
            preferred_contact: String::new(),
            reward: Some(50.0),
        }
    }

    #[tokio::test]
    async fn create_forces_active_status_and_stamps_timestamps() {
        let service = service();
        let item = create(&service, 42, new_item("LOST", "Black Wallet")).await;

        assert!(!item.id.is_empty());
        assert_eq!(item.user_id, 42);
        assert_eq!(item.item_type, "LOST");
        assert_eq!(item.status, "ACTIVE");
        assert!(!item.date_reported.is_empty());
        assert!(!item.created_at.is_empty());
        assert!(!item.updated_at.is_empty());
    }

    #[tokio::test]
    async fn create_requires_caller_metadata() {
        let service = service();
        let err = service
            .create_item(Request::new(new_item("LOST", "Black Wallet")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn create_rejects_unknown_type() {
        let service = service();
        let err = service
            .create_item(as_user(42, new_item("MISPLACED", "Black Wallet")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn create_then_get_round_trips_caller_fields() {
        let service = service();
        let mut req = new_item("FOUND", "Set of keys");
        req.longitude = Some(139.6917);
        req.latitude = Some(35.6895);
        let created = create(&service, 7, req).await;

        let fetched = get(&service, &created.id).await;
        assert_eq!(fetched.title, "Set of keys");
        assert_eq!(fetched.description, "left on the train");
        assert_eq!(fetched.category, "Accessories");
        assert_eq!(fetched.location, "Shinjuku station");
        assert_eq!(fetched.item_type, "FOUND");
        assert_eq!(fetched.longitude, Some(139.6917));
        assert_eq!(fetched.latitude, Some(35.6895));
        assert_eq!(fetched.images, vec!["img-1".to_string()]);
        assert_eq!(fetched.tags, vec!["leather".to_string()]);
        assert_eq!(fetched.contact_email, "owner@example.com");
        assert_eq!(fetched.preferred_contact, "email");
        assert_eq!(fetched.reward, Some(20.0));
        assert!(fetched.date_lost_found.starts_with("2026-08-01T09:30:00"));
    }

    #[tokio::test]
    async fn get_missing_item_is_not_found() {
        let service = service();
        let err = service
            .get_item(Request::new(GetItemReq {
                id: "b17b2b4e-0000-0000-0000-000000000000".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn search_text_mode_excludes_non_active_items() {
        let service = service();
        create(&service, 1, new_item("LOST", "Black Wallet")).await;
        let archived = create(&service, 1, new_item("LOST", "Brown Wallet")).await;
        set_status(&service, &archived.id, "ARCHIVED").await;

        let res = service
            .search_items(Request::new(SearchItemsReq {
                q: "wallet".to_string(),
                item_type: "LOST".to_string(),
                page: 0,
                size: 10,
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(res.total, 1);
        assert_eq!(res.items.len(), 1);
        assert_eq!(res.items[0].title, "Black Wallet");
    }

    #[tokio::test]
    async fn search_matches_description_and_tags_case_insensitively() {
        let service = service();
        let mut by_description = new_item("LOST", "Old phone");
        by_description.description = "has a WALLET case".to_string();
        by_description.tags = Vec::new();
        create(&service, 1, by_description).await;

        let mut by_tag = new_item("LOST", "Card holder");
        by_tag.description = String::new();
        by_tag.tags = vec!["wallet".to_string()];
        create(&service, 1, by_tag).await;

        let mut unrelated = new_item("LOST", "Umbrella");
        unrelated.description = String::new();
        unrelated.tags = Vec::new();
        create(&service, 1, unrelated).await;

        let res = service
            .search_items(Request::new(SearchItemsReq {
                q: "Wallet".to_string(),
                item_type: String::new(),
                page: 0,
                size: 10,
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(res.total, 2);
    }

    #[tokio::test]
    async fn search_rejects_unknown_type() {
        let service = service();
        let err = service
            .search_items(Request::new(SearchItemsReq {
                q: "wallet".to_string(),
                item_type: "STOLEN".to_string(),
                page: 0,
                size: 10,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn browse_mode_orders_by_report_recency() {
        let service = service();
        let first = create(&service, 1, new_item("FOUND", "Reported first")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = create(&service, 1, new_item("FOUND", "Reported second")).await;

        let res = service
            .search_items(Request::new(SearchItemsReq {
                q: String::new(),
                item_type: "FOUND".to_string(),
                page: 0,
                size: 10,
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(res.total, 2);
        assert_eq!(res.items[0].id, second.id);
        assert_eq!(res.items[1].id, first.id);
    }

    #[tokio::test]
    async fn browse_mode_defaults_to_lost_and_skips_non_active() {
        let service = service();
        create(&service, 1, new_item("LOST", "Lost umbrella")).await;
        create(&service, 1, new_item("FOUND", "Found umbrella")).await;
        let resolved = create(&service, 1, new_item("LOST", "Lost glasses")).await;
        set_status(&service, &resolved.id, "RESOLVED").await;

        let res = service
            .search_items(Request::new(SearchItemsReq {
                q: String::new(),
                item_type: String::new(),
                page: 0,
                size: 10,
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(res.total, 1);
        assert_eq!(res.items[0].title, "Lost umbrella");
    }

    #[tokio::test]
    async fn search_pages_and_reports_totals() {
        let service = service();
        for n in 0..3 {
            create(&service, 1, new_item("LOST", &format!("Wallet {}", n))).await;
        }

        let first_page = service
            .search_items(Request::new(SearchItemsReq {
                q: "wallet".to_string(),
                item_type: String::new(),
                page: 0,
                size: 2,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(first_page.items.len(), 2);
        assert_eq!(first_page.total, 3);

        let second_page = service
            .search_items(Request::new(SearchItemsReq {
                q: "wallet".to_string(),
                item_type: String::new(),
                page: 1,
                size: 2,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(second_page.items.len(), 1);
        assert_eq!(second_page.total, 3);
        assert_eq!(second_page.page, 1);
    }

    #[tokio::test]
    async fn search_clamps_oversized_page_requests() {
        let service = service();
        let res = service
            .search_items(Request::new(SearchItemsReq {
                q: "wallet".to_string(),
                item_type: String::new(),
                page: -2,
                size: 5000,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(res.page, 0);
        assert_eq!(res.size, 200);
    }

    #[tokio::test]
    async fn list_user_items_scopes_to_the_caller() {
        let service = service();
        create(&service, 42, new_item("LOST", "Mine")).await;
        create(&service, 7, new_item("LOST", "Someone else's")).await;

        let mine = service
            .list_user_items(as_user(42, Empty {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(mine.items.len(), 1);
        assert_eq!(mine.items[0].title, "Mine");

        let none = service
            .list_user_items(as_user(99, Empty {}))
            .await
            .unwrap()
            .into_inner();
        assert!(none.items.is_empty());
    }

    #[tokio::test]
    async fn list_by_type_normalizes_and_validates() {
        let service = service();
        create(&service, 1, new_item("FOUND", "Found umbrella")).await;
        create(&service, 1, new_item("LOST", "Lost umbrella")).await;

        let found = service
            .list_items_by_type(Request::new(ListItemsByTypeReq {
                item_type: "found".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].item_type, "FOUND");

        let err = service
            .list_items_by_type(Request::new(ListItemsByTypeReq {
                item_type: "TAKEN".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn list_by_category_is_case_sensitive() {
        let service = service();
        create(&service, 1, new_item("LOST", "Black Wallet")).await;

        let hit = service
            .list_items_by_category(Request::new(ListItemsByCategoryReq {
                category: "Accessories".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(hit.items.len(), 1);

        let miss = service
            .list_items_by_category(Request::new(ListItemsByCategoryReq {
                category: "accessories".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(miss.items.is_empty());
    }

    #[tokio::test]
    async fn nearby_includes_the_center_and_excludes_far_and_unlocated_items() {
        let service = service();

        let mut at_center = new_item("LOST", "At the center");
        at_center.longitude = Some(139.6917);
        at_center.latitude = Some(35.6895);
        create(&service, 1, at_center).await;

        // Osaka, ~400 km away
        let mut far = new_item("LOST", "Far away");
        far.longitude = Some(135.5023);
        far.latitude = Some(34.6937);
        create(&service, 1, far).await;

        create(&service, 1, new_item("LOST", "No coordinates")).await;

        let res = service
            .list_nearby_items(Request::new(ListNearbyItemsReq {
                longitude: 139.6917,
                latitude: 35.6895,
                radius: None,
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(res.items.len(), 1);
        assert_eq!(res.items[0].title, "At the center");
    }

    #[tokio::test]
    async fn nearby_rejects_invalid_coordinates_and_radius() {
        let service = service();

        let err = service
            .list_nearby_items(Request::new(ListNearbyItemsReq {
                longitude: 200.0,
                latitude: 35.0,
                radius: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = service
            .list_nearby_items(Request::new(ListNearbyItemsReq {
                longitude: 139.0,
                latitude: 35.0,
                radius: Some(-1.0),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn update_preserves_identity_and_lifecycle_fields() {
        let service = service();
        let created = create(&service, 42, new_item("LOST", "Old title")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let updated = service
            .update_item(Request::new(update_req(&created.id)))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();

        assert_eq!(updated.title, "Black Wallet");
        assert_eq!(updated.item_type, created.item_type);
        assert_eq!(updated.status, created.status);
        assert_eq!(updated.user_id, created.user_id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.date_reported, created.date_reported);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn update_with_partial_coordinates_leaves_position_untouched() {
        let service = service();
        let mut req = new_item("LOST", "Located item");
        req.longitude = Some(139.6917);
        req.latitude = Some(35.6895);
        let created = create(&service, 42, req).await;

        let mut partial = update_req(&created.id);
        partial.latitude = Some(40.0);
        let updated = service
            .update_item(Request::new(partial))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();
        assert_eq!(updated.longitude, Some(139.6917));
        assert_eq!(updated.latitude, Some(35.6895));

        let mut complete = update_req(&created.id);
        complete.longitude = Some(135.5023);
        complete.latitude = Some(34.6937);
        let updated = service
            .update_item(Request::new(complete))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();
        assert_eq!(updated.longitude, Some(135.5023));
        assert_eq!(updated.latitude, Some(34.6937));
    }

    #[tokio::test]
    async fn update_missing_item_is_not_found() {
        let service = service();
        let err = service
            .update_item(Request::new(update_req(
                "b17b2b4e-0000-0000-0000-000000000000",
            )))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn update_status_accepts_any_known_status() {
        let service = service();
        let created = create(&service, 1, new_item("LOST", "Black Wallet")).await;

        // no transition graph: any known value replaces any other
        let matched = set_status(&service, &created.id, "matched").await;
        assert_eq!(matched.status, "MATCHED");
        let active = set_status(&service, &created.id, "ACTIVE").await;
        assert_eq!(active.status, "ACTIVE");
        let resolved = set_status(&service, &created.id, "Resolved").await;
        assert_eq!(resolved.status, "RESOLVED");
    }

    #[tokio::test]
    async fn update_status_rejects_unknown_values_without_side_effects() {
        let service = service();
        let created = create(&service, 1, new_item("LOST", "Black Wallet")).await;

        let err = service
            .update_item_status(Request::new(UpdateItemStatusReq {
                id: created.id.clone(),
                status: "DONATED".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let unchanged = get(&service, &created.id).await;
        assert_eq!(unchanged.status, "ACTIVE");
        assert_eq!(unchanged.updated_at, created.updated_at);
    }

    #[tokio::test]
    async fn update_status_missing_item_is_not_found() {
        let service = service();
        let err = service
            .update_item_status(Request::new(UpdateItemStatusReq {
                id: "b17b2b4e-0000-0000-0000-000000000000".to_string(),
                status: "MATCHED".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_the_record_and_misses_report_not_found() {
        let service = service();

        let err = service
            .delete_item(Request::new(DeleteItemReq {
                id: "b17b2b4e-0000-0000-0000-000000000000".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);

        let created = create(&service, 1, new_item("LOST", "Black Wallet")).await;
        service
            .delete_item(Request::new(DeleteItemReq {
                id: created.id.clone(),
            }))
            .await
            .unwrap();

        let err = service
            .get_item(Request::new(GetItemReq { id: created.id }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn list_all_items_ignores_status_and_type() {
        let service = service();
        create(&service, 1, new_item("LOST", "Lost umbrella")).await;
        let archived = create(&service, 2, new_item("FOUND", "Found umbrella")).await;
        set_status(&service, &archived.id, "ARCHIVED").await;

        let all = service
            .list_all_items(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(all.items.len(), 2);
    }
}
