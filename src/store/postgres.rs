use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Coordinates, Item, ItemDraft, ItemPatch};

use super::{ItemFilter, ItemStore, PageRequest, Sort, EARTH_RADIUS_M};

const ITEM_COLUMNS: &str = "id::text, user_id, organization_id, item_type, status, \
     title, description, category, location, longitude, latitude, \
     date_lost_found, date_reported, images, tags, \
     contact_email, contact_phone, preferred_contact, reward, \
     created_at, updated_at";

/// Item store backed by PostgreSQL. Queries are composed dynamically from
/// the filter's predicate set and executed against the shared pool.
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Flat row shape matching [`ITEM_COLUMNS`].
#[derive(Debug, FromRow)]
struct ItemRow {
    id: String,
    user_id: i64,
    organization_id: Option<i64>,
    item_type: String,
    status: String,
    title: String,
    description: String,
    category: String,
    location: String,
    longitude: Option<f64>,
    latitude: Option<f64>,
    date_lost_found: Option<DateTime<Utc>>,
    date_reported: DateTime<Utc>,
    images: Vec<String>,
    tags: Vec<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    preferred_contact: Option<String>,
    reward: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let item_type = row
            .item_type
            .parse()
            .map_err(|_| AppError::Internal(format!("unknown stored item type '{}'", row.item_type)))?;
        let status = row
            .status
            .parse()
            .map_err(|_| AppError::Internal(format!("unknown stored status '{}'", row.status)))?;

        Ok(Item {
            id: row.id,
            user_id: row.user_id,
            organization_id: row.organization_id,
            item_type,
            status,
            title: row.title,
            description: row.description,
            category: row.category,
            location: row.location,
            coordinates: Coordinates::from_parts(row.longitude, row.latitude),
            date_lost_found: row.date_lost_found,
            date_reported: row.date_reported,
            images: row.images,
            tags: row.tags,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            preferred_contact: row.preferred_contact,
            reward: row.reward,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_items(rows: Vec<ItemRow>) -> AppResult<Vec<Item>> {
    rows.into_iter().map(Item::try_from).collect()
}

/// Escapes LIKE metacharacters and wraps the term for substring matching.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("%{}%", escaped)
}

/// Spherical (haversine) distance in meters between the row's position and
/// the parameters at the given indices, as a SQL expression.
fn haversine_sql(lon_idx: u32, lat_idx: u32) -> String {
    format!(
        "2 * {EARTH_RADIUS_M} * asin(least(1, sqrt(\
         power(sin(radians(latitude - ${lat_idx}) / 2), 2) \
         + cos(radians(${lat_idx})) * cos(radians(latitude)) \
         * power(sin(radians(longitude - ${lon_idx}) / 2), 2))))"
    )
}

struct FilterSql {
    /// Leading-space `" WHERE ..."` fragment, or empty.
    where_clause: String,
    /// First parameter index free for LIMIT/OFFSET.
    next_idx: u32,
    /// Parameter indices of (longitude, latitude) when a proximity predicate
    /// was rendered, for reuse in distance ordering.
    near_params: Option<(u32, u32)>,
}

/// Renders the filter's predicates as numbered-parameter SQL. Parameters are
/// assigned in the fixed field order [`bind_filter`] binds them in.
fn filter_sql(filter: &ItemFilter) -> FilterSql {
    let mut conditions = Vec::new();
    let mut idx = 1u32;
    let mut near_params = None;

    if filter.user_id.is_some() {
        conditions.push(format!("user_id = ${idx}"));
        idx += 1;
    }
    if filter.item_type.is_some() {
        conditions.push(format!("item_type = ${idx}"));
        idx += 1;
    }
    if filter.status.is_some() {
        conditions.push(format!("status = ${idx}"));
        idx += 1;
    }
    if filter.category.is_some() {
        conditions.push(format!("category = ${idx}"));
        idx += 1;
    }
    if filter.term.is_some() {
        conditions.push(format!(
            "(title ILIKE ${idx} OR description ILIKE ${idx} \
             OR EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE tag ILIKE ${idx}))"
        ));
        idx += 1;
    }
    if filter.tags_any.is_some() {
        conditions.push(format!("tags && ${idx}"));
        idx += 1;
    }
    if filter.lost_found_between.is_some() {
        conditions.push(format!("date_lost_found BETWEEN ${} AND ${}", idx, idx + 1));
        idx += 2;
    }
    if filter.near.is_some() {
        let (lon_idx, lat_idx) = (idx, idx + 1);
        conditions.push(format!(
            "(longitude IS NOT NULL AND latitude IS NOT NULL AND {} <= ${})",
            haversine_sql(lon_idx, lat_idx),
            idx + 2
        ));
        near_params = Some((lon_idx, lat_idx));
        idx += 3;
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    FilterSql {
        where_clause,
        next_idx: idx,
        near_params,
    }
}

fn order_clause(sort: Sort, near_params: Option<(u32, u32)>) -> String {
    match sort {
        Sort::Unsorted => match near_params {
            Some((lon_idx, lat_idx)) => {
                format!(" ORDER BY {} ASC", haversine_sql(lon_idx, lat_idx))
            }
            None => String::new(),
        },
        Sort::ById => " ORDER BY id ASC".to_string(),
        Sort::ByDateReportedDesc => " ORDER BY date_reported DESC, id ASC".to_string(),
    }
}

/// Binds the filter's values in the same fixed order [`filter_sql`] assigned
/// their parameter indices.
fn bind_filter<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    filter: &ItemFilter,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    if let Some(user_id) = filter.user_id {
        query = query.bind(user_id);
    }
    if let Some(item_type) = filter.item_type {
        query = query.bind(item_type.as_str());
    }
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(category) = filter.category.clone() {
        query = query.bind(category);
    }
    if let Some(term) = filter.term.as_deref() {
        query = query.bind(like_pattern(term));
    }
    if let Some(tags) = filter.tags_any.clone() {
        query = query.bind(tags);
    }
    if let Some((from, to)) = filter.lost_found_between {
        query = query.bind(from).bind(to);
    }
    if let Some(near) = filter.near {
        query = query
            .bind(near.center.longitude)
            .bind(near.center.latitude)
            .bind(near.radius_m);
    }
    query
}

#[tonic::async_trait]
impl ItemStore for PgItemStore {
    async fn insert(&self, draft: ItemDraft) -> AppResult<Item> {
        let (longitude, latitude) = match draft.coordinates {
            Some(position) => (Some(position.longitude), Some(position.latitude)),
            None => (None, None),
        };

        // status, date_reported and the audit timestamps come from the
        // column defaults
        let sql = format!(
            "INSERT INTO items (user_id, organization_id, item_type, title, description, \
             category, location, longitude, latitude, date_lost_found, images, tags, \
             contact_email, contact_phone, preferred_contact, reward) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {ITEM_COLUMNS}"
        );

        let row: ItemRow = sqlx::query_as(&sql)
            .bind(draft.user_id)
            .bind(draft.organization_id)
            .bind(draft.item_type.as_str())
            .bind(draft.title)
            .bind(draft.description)
            .bind(draft.category)
            .bind(draft.location)
            .bind(longitude)
            .bind(latitude)
            .bind(draft.date_lost_found)
            .bind(draft.images)
            .bind(draft.tags)
            .bind(draft.contact_email)
            .bind(draft.contact_phone)
            .bind(draft.preferred_contact)
            .bind(draft.reward)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Item>> {
        let Ok(id) = Uuid::parse_str(id) else {
            // malformed ids cannot name a record
            return Ok(None);
        };

        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Item::try_from).transpose()
    }

    async fn find(&self, filter: &ItemFilter, sort: Sort) -> AppResult<Vec<Item>> {
        let rendered = filter_sql(filter);
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items{}{}",
            rendered.where_clause,
            order_clause(sort, rendered.near_params)
        );

        let rows: Vec<ItemRow> = bind_filter(sqlx::query_as(&sql), filter)
            .fetch_all(&self.pool)
            .await?;
        rows_to_items(rows)
    }

    async fn find_page(
        &self,
        filter: &ItemFilter,
        sort: Sort,
        page: PageRequest,
    ) -> AppResult<(Vec<Item>, u64)> {
        let rendered = filter_sql(filter);

        let count_sql = format!("SELECT COUNT(*) FROM items{}", rendered.where_clause);
        let (total,): (i64,) = bind_filter(sqlx::query_as(&count_sql), filter)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items{}{} LIMIT ${} OFFSET ${}",
            rendered.where_clause,
            order_clause(sort, rendered.near_params),
            rendered.next_idx,
            rendered.next_idx + 1
        );
        let rows: Vec<ItemRow> = bind_filter(sqlx::query_as(&sql), filter)
            .bind(i64::from(page.size))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows_to_items(rows)?, total as u64))
    }

    async fn update(&self, id: &str, patch: ItemPatch) -> AppResult<Option<Item>> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let mut assignments = Vec::new();
        let mut idx = 1u32;
        if patch.details.is_some() {
            for column in [
                "title",
                "description",
                "category",
                "location",
                "date_lost_found",
                "images",
                "tags",
                "contact_email",
                "contact_phone",
                "preferred_contact",
                "reward",
            ] {
                assignments.push(format!("{column} = ${idx}"));
                idx += 1;
            }
        }
        if patch.coordinates.is_some() {
            assignments.push(format!("longitude = ${idx}"));
            idx += 1;
            assignments.push(format!("latitude = ${idx}"));
            idx += 1;
        }
        if patch.status.is_some() {
            assignments.push(format!("status = ${idx}"));
            idx += 1;
        }
        assignments.push("updated_at = now()".to_string());

        let sql = format!(
            "UPDATE items SET {} WHERE id = ${idx} RETURNING {ITEM_COLUMNS}",
            assignments.join(", ")
        );

        let mut query = sqlx::query_as::<_, ItemRow>(&sql);
        if let Some(details) = patch.details {
            query = query
                .bind(details.title)
                .bind(details.description)
                .bind(details.category)
                .bind(details.location)
                .bind(details.date_lost_found)
                .bind(details.images)
                .bind(details.tags)
                .bind(details.contact_email)
                .bind(details.contact_phone)
                .bind(details.preferred_contact)
                .bind(details.reward);
        }
        if let Some(position) = patch.coordinates {
            query = query.bind(position.longitude).bind(position.latitude);
        }
        if let Some(status) = patch.status {
            query = query.bind(status.as_str());
        }

        let row: Option<ItemRow> = query.bind(id).fetch_optional(&self.pool).await?;
        row.map(Item::try_from).transpose()
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };

        let rows_affected = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}
