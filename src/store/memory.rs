use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Item, ItemDraft, ItemPatch, ItemStatus};

use super::{geodesic_distance_m, ItemFilter, ItemStore, PageRequest, Sort};

/// In-process item store. Selected when no DATABASE_URL is configured; the
/// test suite drives the query engine through it.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    items: RwLock<HashMap<String, Item>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect(&self, filter: &ItemFilter, sort: Sort) -> Vec<Item> {
        let items = self.items.read().await;
        let mut matched: Vec<Item> = items
            .values()
            .filter(|item| matches(item, filter))
            .cloned()
            .collect();
        sort_items(&mut matched, filter, sort);
        matched
    }
}

fn matches(item: &Item, filter: &ItemFilter) -> bool {
    if let Some(user_id) = filter.user_id {
        if item.user_id != user_id {
            return false;
        }
    }
    if let Some(item_type) = filter.item_type {
        if item.item_type != item_type {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if item.status != status {
            return false;
        }
    }
    if let Some(ref category) = filter.category {
        if &item.category != category {
            return false;
        }
    }
    if let Some(ref term) = filter.term {
        let needle = term.to_lowercase();
        let hit = item.title.to_lowercase().contains(&needle)
            || item.description.to_lowercase().contains(&needle)
            || item
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle));
        if !hit {
            return false;
        }
    }
    if let Some(ref tags) = filter.tags_any {
        if !item.tags.iter().any(|tag| tags.contains(tag)) {
            return false;
        }
    }
    if let Some((from, to)) = filter.lost_found_between {
        match item.date_lost_found {
            Some(date) if date >= from && date <= to => {}
            _ => return false,
        }
    }
    if let Some(near) = filter.near {
        match item.coordinates {
            Some(position) if geodesic_distance_m(position, near.center) <= near.radius_m => {}
            _ => return false,
        }
    }
    true
}

fn sort_items(items: &mut [Item], filter: &ItemFilter, sort: Sort) {
    match sort {
        Sort::Unsorted => {
            if let Some(near) = filter.near {
                items.sort_by(|a, b| {
                    // coordinates are present on every proximity match
                    let da = a.coordinates.map(|c| geodesic_distance_m(c, near.center));
                    let db = b.coordinates.map(|c| geodesic_distance_m(c, near.center));
                    da.partial_cmp(&db).unwrap_or(Ordering::Equal)
                });
            } else {
                // HashMap order is arbitrary; keep plain listings stable
                items.sort_by(|a, b| a.id.cmp(&b.id));
            }
        }
        Sort::ById => items.sort_by(|a, b| a.id.cmp(&b.id)),
        Sort::ByDateReportedDesc => items.sort_by(|a, b| {
            b.date_reported
                .cmp(&a.date_reported)
                .then_with(|| a.id.cmp(&b.id))
        }),
    }
}

#[tonic::async_trait]
impl ItemStore for MemoryItemStore {
    async fn insert(&self, draft: ItemDraft) -> AppResult<Item> {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4().to_string(),
            user_id: draft.user_id,
            organization_id: draft.organization_id,
            item_type: draft.item_type,
            status: ItemStatus::Active,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            location: draft.location,
            coordinates: draft.coordinates,
            date_lost_found: draft.date_lost_found,
            date_reported: now,
            images: draft.images,
            tags: draft.tags,
            contact_email: draft.contact_email,
            contact_phone: draft.contact_phone,
            preferred_contact: draft.preferred_contact,
            reward: draft.reward,
            created_at: now,
            updated_at: now,
        };
        self.items
            .write()
            .await
            .insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Item>> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn find(&self, filter: &ItemFilter, sort: Sort) -> AppResult<Vec<Item>> {
        Ok(self.collect(filter, sort).await)
    }

    async fn find_page(
        &self,
        filter: &ItemFilter,
        sort: Sort,
        page: PageRequest,
    ) -> AppResult<(Vec<Item>, u64)> {
        let matched = self.collect(filter, sort).await;
        let total = matched.len() as u64;
        let slice = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect();
        Ok((slice, total))
    }

    async fn update(&self, id: &str, patch: ItemPatch) -> AppResult<Option<Item>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(id) else {
            return Ok(None);
        };

        if let Some(details) = patch.details {
            item.title = details.title;
            item.description = details.description;
            item.category = details.category;
            item.location = details.location;
            item.date_lost_found = details.date_lost_found;
            item.images = details.images;
            item.tags = details.tags;
            item.contact_email = details.contact_email;
            item.contact_phone = details.contact_phone;
            item.preferred_contact = details.preferred_contact;
            item.reward = details.reward;
        }
        if let Some(coordinates) = patch.coordinates {
            item.coordinates = Some(coordinates);
        }
        if let Some(status) = patch.status {
            item.status = status;
        }
        item.updated_at = Utc::now();

        Ok(Some(item.clone()))
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.items.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::{Coordinates, ItemType};
    use crate::store::Proximity;

    fn draft(title: &str, tags: &[&str]) -> ItemDraft {
        ItemDraft {
            user_id: 1,
            organization_id: None,
            item_type: ItemType::Lost,
            title: title.to_string(),
            description: String::new(),
            category: String::new(),
            location: String::new(),
            coordinates: None,
            date_lost_found: None,
            images: Vec::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            contact_email: None,
            contact_phone: None,
            preferred_contact: None,
            reward: None,
        }
    }

    #[tokio::test]
    async fn term_matches_tags_case_insensitively() {
        let store = MemoryItemStore::new();
        store.insert(draft("Umbrella", &["Station", "Blue"])).await.unwrap();
        store.insert(draft("Keys", &["keychain"])).await.unwrap();

        let filter = ItemFilter {
            term: Some("station".to_string()),
            ..Default::default()
        };
        let found = store.find(&filter, Sort::Unsorted).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Umbrella");
    }

    #[tokio::test]
    async fn tags_any_requires_an_exact_tag() {
        let store = MemoryItemStore::new();
        store.insert(draft("Umbrella", &["station"])).await.unwrap();

        let hit = ItemFilter {
            tags_any: Some(vec!["station".to_string()]),
            ..Default::default()
        };
        assert_eq!(store.find(&hit, Sort::Unsorted).await.unwrap().len(), 1);

        let miss = ItemFilter {
            tags_any: Some(vec!["stat".to_string()]),
            ..Default::default()
        };
        assert!(store.find(&miss, Sort::Unsorted).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn date_range_excludes_unset_dates() {
        let store = MemoryItemStore::new();
        let mut inside = draft("Inside", &[]);
        inside.date_lost_found = Some(Utc::now());
        store.insert(inside).await.unwrap();
        store.insert(draft("Undated", &[])).await.unwrap();

        let filter = ItemFilter {
            lost_found_between: Some((
                Utc::now() - Duration::days(1),
                Utc::now() + Duration::days(1),
            )),
            ..Default::default()
        };
        let found = store.find(&filter, Sort::Unsorted).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Inside");
    }

    #[tokio::test]
    async fn proximity_orders_nearest_first() {
        let store = MemoryItemStore::new();
        let mut near = draft("Near", &[]);
        near.coordinates = Some(Coordinates { longitude: 139.70, latitude: 35.69 });
        let mut at_center = draft("Center", &[]);
        at_center.coordinates = Some(Coordinates { longitude: 139.6917, latitude: 35.6895 });
        store.insert(near).await.unwrap();
        store.insert(at_center).await.unwrap();

        let filter = ItemFilter {
            near: Some(Proximity {
                center: Coordinates { longitude: 139.6917, latitude: 35.6895 },
                radius_m: 5000.0,
            }),
            ..Default::default()
        };
        let found = store.find(&filter, Sort::Unsorted).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].title, "Center");
        assert_eq!(found[1].title, "Near");
    }
}
