//! `PostgreSQL` implementation of [`ShelterStore`].
//!
//! All statements go through `query_raw_params()` / `exec_raw_params()` with
//! `$n` placeholders. Search renders the compiled [`Predicate`] into the
//! `WHERE` clause of a single statement that returns the match count, the
//! page slice, and each row's need preview together, so the three always
//! come from one snapshot.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use shelter_map_database_models::{
    ActiveNeedRow, NEED_PREVIEW_LIMIT, Page, PageRequest, Pagination, ShelterDetail,
    ShelterSummary,
};
use shelter_map_shelter_models::{
    Coordinates, Location, LocationKind, LocationType, Need, NeedStatus, Occupancy,
};
use switchy_database::{Database, DatabaseValue, Row};

use crate::DbError;
use crate::filter::Predicate;
use crate::store::ShelterStore;

/// Orders needs `HIGH` before `MED` before `LOW`.
const PRIORITY_RANK_SQL: &str = "CASE {a}.priority WHEN 'HIGH' THEN 0 WHEN 'MED' THEN 1 ELSE 2 END";

const LOCATION_COLUMNS: [&str; 17] = [
    "id",
    "location_type",
    "name",
    "city",
    "neighborhood",
    "address",
    "lat",
    "lng",
    "status",
    "capacity",
    "occupancy",
    "accessible",
    "accepts_pets",
    "public_contact",
    "hours",
    "notes",
    "updated_at",
];

const NEED_COLUMNS: [&str; 10] = [
    "id",
    "shelter_id",
    "category",
    "item",
    "priority",
    "quantity",
    "unit",
    "status",
    "notes",
    "updated_at",
];

/// Shelter store backed by a `switchy_database` connection.
pub struct SqlStore {
    db: Arc<dyn Database>,
}

impl SqlStore {
    /// Wraps an open connection. Migrations must already have been run.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Runs the combined count, page and preview statement.
    async fn fetch_page(
        &self,
        predicate: &Predicate,
        request: PageRequest,
        preview_limit: usize,
    ) -> Result<(u64, Vec<(Location, Vec<Need>)>), DbError> {
        let (sql, params) = search_sql(predicate, request, preview_limit);
        let rows = self.db.query_raw_params(&sql, &params).await?;

        let total: i64 = match rows.first() {
            Some(row) => row.to_value("total").map_err(conversion("total"))?,
            None => 0,
        };

        let mut items: Vec<(Location, Vec<Need>)> = Vec::new();
        for row in &rows {
            let id: Option<String> = row.to_value("id").unwrap_or(None);
            let Some(id) = id else {
                continue;
            };
            if items.last().is_none_or(|(location, _)| location.id != id) {
                items.push((location_from_row(row)?, Vec::new()));
            }
            if let Some(need) = optional_need_from_row(row)? {
                if let Some((_, needs)) = items.last_mut() {
                    needs.push(need);
                }
            }
        }

        Ok((u64::try_from(total).unwrap_or(0), items))
    }
}

#[async_trait::async_trait]
impl ShelterStore for SqlStore {
    async fn search(
        &self,
        predicate: &Predicate,
        request: PageRequest,
    ) -> Result<Page<ShelterSummary>, DbError> {
        let (total, items) = self
            .fetch_page(predicate, request, NEED_PREVIEW_LIMIT)
            .await?;

        Ok(Page {
            items: items
                .into_iter()
                .map(|(location, needs)| ShelterSummary { location, needs })
                .collect(),
            pagination: Pagination::new(request, total),
        })
    }

    async fn list_locations(
        &self,
        predicate: &Predicate,
        request: PageRequest,
    ) -> Result<Page<Location>, DbError> {
        let (total, items) = self.fetch_page(predicate, request, 0).await?;

        Ok(Page {
            items: items.into_iter().map(|(location, _)| location).collect(),
            pagination: Pagination::new(request, total),
        })
    }

    async fn get_shelter(&self, id: &str) -> Result<Option<ShelterDetail>, DbError> {
        let sql = format!(
            "SELECT {}, {}
             FROM shelters s
             LEFT JOIN needs n ON n.shelter_id = s.id
             WHERE s.id = $1
             ORDER BY {}, n.updated_at DESC, n.id ASC",
            select_list("s", &LOCATION_COLUMNS, ""),
            select_list("n", &NEED_COLUMNS, "need_"),
            priority_rank("n"),
        );

        let rows = self
            .db
            .query_raw_params(&sql, &[DatabaseValue::String(id.to_string())])
            .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let location = location_from_row(first)?;
        let mut needs = Vec::new();
        for row in &rows {
            if let Some(need) = optional_need_from_row(row)? {
                needs.push(need);
            }
        }

        Ok(Some(ShelterDetail { location, needs }))
    }

    async fn distinct_cities(&self) -> Result<Vec<String>, DbError> {
        let rows = self
            .db
            .query_raw_params("SELECT DISTINCT city FROM shelters", &[])
            .await?;

        let mut cities = rows
            .iter()
            .map(|row| row.to_value("city").map_err(conversion("city")))
            .collect::<Result<Vec<String>, _>>()?;
        cities.sort();

        Ok(cities)
    }

    async fn active_needs(&self) -> Result<Vec<ActiveNeedRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT n.category, n.item, n.unit, n.priority, n.quantity,
                        n.shelter_id, s.name AS shelter_name
                 FROM needs n
                 JOIN shelters s ON s.id = n.shelter_id
                 WHERE n.status = $1
                 ORDER BY n.updated_at DESC, n.id ASC",
                &[DatabaseValue::String(NeedStatus::Active.to_string())],
            )
            .await?;

        let mut needs = Vec::with_capacity(rows.len());
        for row in &rows {
            let priority: String = row.to_value("priority").map_err(conversion("priority"))?;
            needs.push(ActiveNeedRow {
                category: row.to_value("category").map_err(conversion("category"))?,
                item: row.to_value("item").map_err(conversion("item"))?,
                unit: row.to_value("unit").unwrap_or(None),
                priority: parse_enum(&priority, "priority")?,
                quantity: row.to_value("quantity").unwrap_or(None),
                shelter_id: row
                    .to_value("shelter_id")
                    .map_err(conversion("shelter_id"))?,
                shelter_name: row
                    .to_value("shelter_name")
                    .map_err(conversion("shelter_name"))?,
            });
        }

        Ok(needs)
    }

    async fn insert_location(&self, location: &Location) -> Result<(), DbError> {
        self.db
            .exec_raw_params(
                "INSERT INTO shelters (
                    id, location_type, name, city, neighborhood, address, lat, lng,
                    status, capacity, occupancy, accessible, accepts_pets,
                    public_contact, hours, notes, updated_at
                 ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
                 )",
                &location_params(location)?,
            )
            .await?;

        log::debug!("Inserted location {}", location.id);
        Ok(())
    }

    async fn update_location(&self, location: &Location) -> Result<bool, DbError> {
        let updated = self
            .db
            .exec_raw_params(
                "UPDATE shelters SET
                    location_type = $2, name = $3, city = $4, neighborhood = $5,
                    address = $6, lat = $7, lng = $8, status = $9, capacity = $10,
                    occupancy = $11, accessible = $12, accepts_pets = $13,
                    public_contact = $14, hours = $15, notes = $16, updated_at = $17
                 WHERE id = $1",
                &location_params(location)?,
            )
            .await?;

        Ok(updated > 0)
    }

    async fn delete_location(&self, id: &str) -> Result<bool, DbError> {
        let deleted = self
            .db
            .exec_raw_params(
                "DELETE FROM shelters WHERE id = $1",
                &[DatabaseValue::String(id.to_string())],
            )
            .await?;

        Ok(deleted > 0)
    }

    async fn get_need(&self, id: &str) -> Result<Option<Need>, DbError> {
        let sql = format!(
            "SELECT {} FROM needs n WHERE n.id = $1",
            select_list("n", &NEED_COLUMNS, "need_"),
        );
        let rows = self
            .db
            .query_raw_params(&sql, &[DatabaseValue::String(id.to_string())])
            .await?;

        rows.first().map(|row| need_from_row(row, "need_")).transpose()
    }

    async fn insert_need(&self, need: &Need) -> Result<bool, DbError> {
        // Casts pin the parameter types, which Postgres cannot infer from a
        // bare SELECT list.
        let inserted = self
            .db
            .exec_raw_params(
                "INSERT INTO needs (
                    id, shelter_id, category, item, priority, quantity, unit,
                    status, notes, updated_at
                 )
                 SELECT $1::TEXT, $2::TEXT, $3::TEXT, $4::TEXT, $5::TEXT,
                        $6::DOUBLE PRECISION, $7::TEXT, $8::TEXT, $9::TEXT, $10::TIMESTAMP
                 WHERE EXISTS (SELECT 1 FROM shelters WHERE id = $2::TEXT)",
                &need_params(need),
            )
            .await?;

        Ok(inserted > 0)
    }

    async fn update_need(&self, need: &Need) -> Result<bool, DbError> {
        let updated = self
            .db
            .exec_raw_params(
                "UPDATE needs SET
                    shelter_id = $2, category = $3, item = $4, priority = $5,
                    quantity = $6, unit = $7, status = $8, notes = $9, updated_at = $10
                 WHERE id = $1",
                &need_params(need),
            )
            .await?;

        Ok(updated > 0)
    }

    async fn delete_need(&self, id: &str) -> Result<bool, DbError> {
        let deleted = self
            .db
            .exec_raw_params(
                "DELETE FROM needs WHERE id = $1",
                &[DatabaseValue::String(id.to_string())],
            )
            .await?;

        Ok(deleted > 0)
    }
}

fn priority_rank(alias: &str) -> String {
    PRIORITY_RANK_SQL.replace("{a}", alias)
}

/// Builds the combined count, page and preview statement.
///
/// The filter's parameters come first, followed by `LIMIT`, `OFFSET` and
/// the preview size.
fn search_sql(
    predicate: &Predicate,
    request: PageRequest,
    preview_limit: usize,
) -> (String, Vec<DatabaseValue>) {
    let mut params = Vec::new();
    let where_clause = predicate.to_sql("s", &mut params);

    let mut sql = format!(
        "WITH matched AS (SELECT s.* FROM shelters s WHERE {where_clause}),
         match_count AS (SELECT COUNT(*) AS total FROM matched),"
    );

    params.push(DatabaseValue::Int64(i64::from(request.page_size)));
    let limit_idx = params.len();
    params.push(DatabaseValue::Int64(
        i64::try_from(request.offset()).unwrap_or(i64::MAX),
    ));
    let offset_idx = params.len();
    write!(
        sql,
        " page_rows AS (SELECT * FROM matched ORDER BY updated_at DESC, id ASC
                        LIMIT ${limit_idx} OFFSET ${offset_idx}),"
    )
    .unwrap();

    write!(
        sql,
        " preview AS (SELECT n.*, ROW_NUMBER() OVER (
                          PARTITION BY n.shelter_id
                          ORDER BY {}, n.updated_at DESC, n.id ASC
                      ) AS preview_rank
                      FROM needs n
                      JOIN page_rows pr ON pr.id = n.shelter_id
                      WHERE n.status = '{}')",
        priority_rank("n"),
        NeedStatus::Active,
    )
    .unwrap();

    params.push(DatabaseValue::Int64(
        i64::try_from(preview_limit).unwrap_or(i64::MAX),
    ));
    write!(
        sql,
        " SELECT c.total, {}, {}
          FROM match_count c
          LEFT JOIN page_rows p ON TRUE
          LEFT JOIN preview pv ON pv.shelter_id = p.id AND pv.preview_rank <= ${}
          ORDER BY p.updated_at DESC, p.id ASC, pv.preview_rank ASC",
        select_list("p", &LOCATION_COLUMNS, ""),
        select_list("pv", &NEED_COLUMNS, "need_"),
        params.len(),
    )
    .unwrap();

    (sql, params)
}

/// Renders `alias.col AS {prefix}col` for every column.
fn select_list(alias: &str, columns: &[&str], prefix: &str) -> String {
    let mut sql = String::new();
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        write!(sql, "{alias}.{column} AS {prefix}{column}").unwrap();
    }
    sql
}

fn conversion<E: std::fmt::Display>(column: &str) -> impl FnOnce(E) -> DbError + '_ {
    move |e| DbError::Conversion {
        message: format!("Failed to read column {column}: {e}"),
    }
}

fn parse_enum<T: FromStr>(value: &str, column: &str) -> Result<T, DbError> {
    value.parse().map_err(|_| DbError::Conversion {
        message: format!("Unexpected {column} value: {value}"),
    })
}

fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

fn opt_string(value: Option<&String>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |v| DatabaseValue::String(v.clone()))
}

fn location_params(location: &Location) -> Result<Vec<DatabaseValue>, DbError> {
    let (status, capacity, occupancy) = match location.kind.occupancy() {
        Some(o) => (
            DatabaseValue::String(o.status.to_string()),
            DatabaseValue::Int32(int_column(o.capacity, "capacity")?),
            DatabaseValue::Int32(int_column(o.occupancy, "occupancy")?),
        ),
        None => (DatabaseValue::Null, DatabaseValue::Null, DatabaseValue::Null),
    };

    Ok(vec![
        DatabaseValue::String(location.id.clone()),
        DatabaseValue::String(location.location_type().to_string()),
        DatabaseValue::String(location.name.clone()),
        DatabaseValue::String(location.city.clone()),
        DatabaseValue::String(location.neighborhood.clone()),
        DatabaseValue::String(location.address.clone()),
        DatabaseValue::Real64(location.coordinates.lat),
        DatabaseValue::Real64(location.coordinates.lng),
        status,
        capacity,
        occupancy,
        DatabaseValue::Bool(location.accessible),
        DatabaseValue::Bool(location.accepts_pets),
        opt_string(location.public_contact.as_ref()),
        opt_string(location.hours.as_ref()),
        opt_string(location.notes.as_ref()),
        DatabaseValue::DateTime(location.updated_at.naive_utc()),
    ])
}

fn need_params(need: &Need) -> Vec<DatabaseValue> {
    vec![
        DatabaseValue::String(need.id.clone()),
        DatabaseValue::String(need.shelter_id.clone()),
        DatabaseValue::String(need.category.clone()),
        DatabaseValue::String(need.item.clone()),
        DatabaseValue::String(need.priority.to_string()),
        need.quantity.map_or(DatabaseValue::Null, DatabaseValue::Real64),
        opt_string(need.unit.as_ref()),
        DatabaseValue::String(need.status.to_string()),
        opt_string(need.notes.as_ref()),
        DatabaseValue::DateTime(need.updated_at.naive_utc()),
    ]
}

fn int_column(value: u32, column: &str) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("{column} {value} does not fit an INTEGER column"),
    })
}

fn uint_column(value: i32, column: &str) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("Negative {column}: {value}"),
    })
}

fn location_from_row(row: &Row) -> Result<Location, DbError> {
    let location_type: String = row
        .to_value("location_type")
        .map_err(conversion("location_type"))?;

    let kind = match parse_enum::<LocationType>(&location_type, "location_type")? {
        LocationType::DonationPoint => LocationKind::DonationPoint,
        LocationType::Shelter => {
            let status: Option<String> = row.to_value("status").unwrap_or(None);
            let capacity: Option<i32> = row.to_value("capacity").unwrap_or(None);
            let occupancy: Option<i32> = row.to_value("occupancy").unwrap_or(None);
            let (Some(status), Some(capacity), Some(occupancy)) = (status, capacity, occupancy)
            else {
                return Err(DbError::Conversion {
                    message: "Shelter row is missing status, capacity or occupancy".to_string(),
                });
            };
            LocationKind::Shelter(Occupancy {
                status: parse_enum(&status, "status")?,
                capacity: uint_column(capacity, "capacity")?,
                occupancy: uint_column(occupancy, "occupancy")?,
            })
        }
    };

    let updated_at: NaiveDateTime = row
        .to_value("updated_at")
        .map_err(conversion("updated_at"))?;

    Ok(Location {
        id: row.to_value("id").map_err(conversion("id"))?,
        kind,
        name: row.to_value("name").map_err(conversion("name"))?,
        city: row.to_value("city").map_err(conversion("city"))?,
        neighborhood: row
            .to_value("neighborhood")
            .map_err(conversion("neighborhood"))?,
        address: row.to_value("address").map_err(conversion("address"))?,
        coordinates: Coordinates {
            lat: row.to_value("lat").map_err(conversion("lat"))?,
            lng: row.to_value("lng").map_err(conversion("lng"))?,
        },
        accessible: row.to_value("accessible").unwrap_or(false),
        accepts_pets: row.to_value("accepts_pets").unwrap_or(false),
        public_contact: row.to_value("public_contact").unwrap_or(None),
        hours: row.to_value("hours").unwrap_or(None),
        notes: row.to_value("notes").unwrap_or(None),
        updated_at: to_utc(updated_at),
    })
}

/// Reads the `need_`-prefixed columns of a `LEFT JOIN` row, returning
/// `None` when the join produced no need.
fn optional_need_from_row(row: &Row) -> Result<Option<Need>, DbError> {
    let id: Option<String> = row.to_value("need_id").unwrap_or(None);
    if id.is_none() {
        return Ok(None);
    }
    need_from_row(row, "need_").map(Some)
}

fn need_from_row(row: &Row, prefix: &str) -> Result<Need, DbError> {
    let column = |name: &str| format!("{prefix}{name}");

    let priority: String = row
        .to_value(column("priority").as_str())
        .map_err(conversion("priority"))?;
    let status: String = row
        .to_value(column("status").as_str())
        .map_err(conversion("status"))?;
    let updated_at: NaiveDateTime = row
        .to_value(column("updated_at").as_str())
        .map_err(conversion("updated_at"))?;

    Ok(Need {
        id: row.to_value(column("id").as_str()).map_err(conversion("id"))?,
        shelter_id: row
            .to_value(column("shelter_id").as_str())
            .map_err(conversion("shelter_id"))?,
        category: row
            .to_value(column("category").as_str())
            .map_err(conversion("category"))?,
        item: row.to_value(column("item").as_str()).map_err(conversion("item"))?,
        priority: parse_enum(&priority, "priority")?,
        quantity: row.to_value(column("quantity").as_str()).unwrap_or(None),
        unit: row.to_value(column("unit").as_str()).unwrap_or(None),
        status: parse_enum(&status, "status")?,
        notes: row.to_value(column("notes").as_str()).unwrap_or(None),
        updated_at: to_utc(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use shelter_map_database_models::{PageLimits, ShelterCriteria};

    use super::*;
    use crate::filter::compile;

    #[test]
    fn search_sql_numbers_paging_after_filter_params() {
        let predicate = compile(&ShelterCriteria {
            search: Some("centro".to_string()),
            status: Some(shelter_map_shelter_models::ShelterStatus::Open),
            accepts_pets: Some(true),
            needs: vec!["água".to_string()],
            ..ShelterCriteria::default()
        });
        let request = PageRequest::new(Some(3), Some(5), PageLimits::PUBLIC);

        let (sql, params) = search_sql(&predicate, request, NEED_PREVIEW_LIMIT);

        assert!(sql.starts_with(
            "WITH matched AS (SELECT s.* FROM shelters s WHERE ((LOWER(s.name) LIKE $1"
        ));
        assert!(sql.contains("LOWER(pn.item) LIKE $7 ESCAPE"));
        assert!(sql.contains("LIMIT $8 OFFSET $9)"));
        assert!(sql.contains("pv.preview_rank <= $10"));
        assert!(!sql.contains("$11"));

        assert_eq!(params.len(), 10);
        assert!(matches!(params[7], DatabaseValue::Int64(5)));
        assert!(matches!(params[8], DatabaseValue::Int64(10)));
        assert!(matches!(params[9], DatabaseValue::Int64(3)));
    }

    #[test]
    fn search_sql_without_filters_binds_only_paging() {
        let request = PageRequest::new(None, None, PageLimits::PANEL);

        let (sql, params) = search_sql(&Predicate::always(), request, 0);

        assert!(sql.contains("FROM shelters s WHERE 1=1)"));
        assert!(sql.contains("LIMIT $1 OFFSET $2)"));
        assert!(sql.contains("pv.preview_rank <= $3"));
        assert!(sql.contains("JOIN page_rows pr ON pr.id = n.shelter_id"));
        assert!(sql.contains("WHERE n.status = 'ACTIVE'"));
        assert!(sql.contains("LEFT JOIN page_rows p ON TRUE"));
        assert!(sql.contains("ORDER BY p.updated_at DESC, p.id ASC, pv.preview_rank ASC"));

        assert_eq!(params.len(), 3);
        assert!(matches!(params[0], DatabaseValue::Int64(12)));
        assert!(matches!(params[1], DatabaseValue::Int64(0)));
        assert!(matches!(params[2], DatabaseValue::Int64(0)));
    }

    #[test]
    fn select_list_prefixes_aliases() {
        assert_eq!(
            select_list("pv", &["id", "item"], "need_"),
            "pv.id AS need_id, pv.item AS need_item"
        );
    }

    #[test]
    fn priority_rank_uses_alias() {
        assert_eq!(
            priority_rank("n"),
            "CASE n.priority WHEN 'HIGH' THEN 0 WHEN 'MED' THEN 1 ELSE 2 END"
        );
    }

    #[test]
    fn parse_enum_reports_unknown_values() {
        let err = parse_enum::<NeedStatus>("DONE", "status").unwrap_err();
        assert!(err.to_string().contains("DONE"));
        assert_eq!(
            parse_enum::<NeedStatus>("FULFILLED", "status").unwrap(),
            NeedStatus::Fulfilled
        );
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(uint_column(-1, "capacity").is_err());
        assert_eq!(uint_column(7, "capacity").unwrap(), 7);
        assert!(int_column(u32::MAX, "capacity").is_err());
    }
}
