//! Generic read engine shared by every entity.
//!
//! One [`QueryEngine`] is built per collection from a [`QueryConfig`]; the engine never
//! reports "no results" as an error, it answers with [`Outcome::Empty`] or
//! [`Outcome::NotFound`] instead.

use crate::outcome::{Outcome, Payload};
use crate::store::{matcher, Collection, FindSpec, CREATED};
use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use service_core::error::AppError;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;
pub const SEARCH_LIMIT: i64 = 20;

const NO_MATCH: &str = "No document found by this request";

/// Per-entity behaviour of the engine.
#[derive(Debug, Clone, Copy)]
pub struct QueryConfig {
    /// Fields searched when the caller does not pass `fields`.
    pub search_fields: &'static [&'static str],
    pub default_sort_field: &'static str,
}

impl QueryConfig {
    pub const fn searching(search_fields: &'static [&'static str]) -> Self {
        Self {
            search_fields,
            default_sort_field: CREATED,
        }
    }
}

/// Query string accepted by the read routes. Everything arrives as text and is parsed
/// leniently; unparseable paging values fall back to their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub page: Option<String>,
    pub items: Option<String>,
    pub sort_by: Option<String>,
    pub sort_value: Option<String>,
    /// `listAll` only: `asc`/`desc` on the default sort field.
    pub sort: Option<String>,
    pub q: Option<String>,
    pub fields: Option<String>,
    pub filter: Option<String>,
    pub equal: Option<String>,
    pub enabled: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub pages: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub result: Vec<Document>,
    pub pagination: Pagination,
}

impl Payload for Page {
    fn into_json(self) -> Value {
        json!({
            "result": self.result.into_json(),
            "pagination": self.pagination,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub count_filter: u64,
    pub count_all_docs: u64,
}

impl Payload for Summary {
    fn into_json(self) -> Value {
        json!({
            "countFilter": self.count_filter,
            "countAllDocs": self.count_all_docs,
        })
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    collection: Collection,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(collection: Collection, config: QueryConfig) -> Self {
        Self { collection, config }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub async fn read(&self, id: &str) -> Result<Outcome<Document>, AppError> {
        Ok(match self.collection.find_by_id(id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound(format!("No document found by id: {}", id)),
        })
    }

    /// One page of documents plus pagination metadata.
    pub async fn list(&self, params: &QueryParams) -> Result<Outcome<Page>, AppError> {
        let page = positive(params.page.as_deref(), 1);
        let items = positive(params.items.as_deref(), DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let filter = self.shared_filter(params)?;
        let skip = (page - 1).saturating_mul(items);

        let (result, count) = futures::try_join!(
            self.collection.find(
                filter.clone(),
                FindSpec::page(self.page_sort(params), skip, items as i64),
            ),
            self.collection.count(filter),
        )?;

        if count == 0 {
            return Ok(Outcome::Empty);
        }

        Ok(Outcome::Ok(Page {
            result,
            pagination: Pagination {
                page,
                pages: count.div_ceil(items),
                count,
            },
        }))
    }

    /// Every matching document, sorted, without paging.
    pub async fn list_all(&self, params: &QueryParams) -> Result<Outcome<Vec<Document>>, AppError> {
        let mut filter = self.shared_filter(params)?;
        if let Some(enabled) = params.enabled.as_deref().and_then(parse_bool) {
            filter.insert("enabled", enabled);
        }
        let sort = doc! { self.config.default_sort_field: direction(params.sort.as_deref()) };

        let documents = self.collection.find(filter, FindSpec::sorted(sort)).await?;
        if documents.is_empty() {
            return Ok(Outcome::Empty);
        }
        Ok(Outcome::Ok(documents))
    }

    /// Case-insensitive substring search, capped at [`SEARCH_LIMIT`] results.
    pub async fn search(&self, params: &QueryParams) -> Result<Outcome<Vec<Document>>, AppError> {
        let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
            return Ok(Outcome::NotFound(NO_MATCH.to_string()));
        };

        let mut fields = split_fields(params.fields.as_deref())?;
        if fields.is_empty() {
            fields = self.config.search_fields.to_vec();
        }

        let spec = FindSpec {
            sort: Some(self.default_sort()),
            skip: None,
            limit: Some(SEARCH_LIMIT),
        };
        let documents = self.collection.find(search_clause(q, &fields), spec).await?;

        if documents.is_empty() {
            return Ok(Outcome::NotFound(NO_MATCH.to_string()));
        }
        Ok(Outcome::Ok(documents))
    }

    /// Exact match of one field against one value. Both parameters are mandatory.
    pub async fn filter(&self, params: &QueryParams) -> Result<Outcome<Vec<Document>>, AppError> {
        let (field, value) = equality_params(params)?
            .ok_or_else(|| AppError::bad_request("filter and equal are both required"))?;

        let documents = self
            .collection
            .find(
                equality_clause(field, value),
                FindSpec::sorted(self.default_sort()),
            )
            .await?;
        Ok(Outcome::Ok(documents))
    }

    /// Counts for the whole collection and, optionally, for one equality filter.
    pub async fn summary(&self, params: &QueryParams) -> Result<Outcome<Summary>, AppError> {
        let equality = equality_params(params)?;

        let count_all_docs = self.collection.count(doc! {}).await?;
        if count_all_docs == 0 {
            return Ok(Outcome::Empty);
        }

        let matching = match equality {
            Some((field, value)) => equality_clause(field, value),
            None => doc! {},
        };
        let rows = self
            .collection
            .aggregate(vec![doc! { "$match": matching }, doc! { "$count": "count" }])
            .await?;
        // `$count` emits no row at all when nothing matched.
        let count_filter = rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(matcher::as_f64)
            .map(|count| count as u64)
            .unwrap_or(0);

        Ok(Outcome::Ok(Summary {
            count_filter,
            count_all_docs,
        }))
    }

    fn default_sort(&self) -> Document {
        doc! { self.config.default_sort_field: -1 }
    }

    fn page_sort(&self, params: &QueryParams) -> Document {
        let field = params
            .sort_by
            .as_deref()
            .map(str::trim)
            .filter(|field| !field.is_empty() && !field.starts_with('$'))
            .unwrap_or(self.config.default_sort_field);
        doc! { field: direction(params.sort_value.as_deref()) }
    }

    /// Search and equality clauses understood by `list` and `listAll`. A lone `filter`
    /// or `equal` is ignored here.
    fn shared_filter(&self, params: &QueryParams) -> Result<Document, AppError> {
        let mut filter = doc! {};

        let q = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
        let fields = split_fields(params.fields.as_deref())?;
        if let Some(q) = q {
            if !fields.is_empty() {
                merge(&mut filter, search_clause(q, &fields));
            }
        }

        if let (Some(field), Some(value)) = (params.filter.as_deref(), params.equal.as_deref()) {
            let field = checked_field(field)?;
            merge(&mut filter, equality_clause(field, value));
        }
        Ok(filter)
    }
}

fn merge(filter: &mut Document, clause: Document) {
    for (key, value) in clause {
        filter.insert(key, value);
    }
}

fn positive(value: Option<&str>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// `1`/`asc` sorts ascending, anything else descending.
fn direction(value: Option<&str>) -> i32 {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1") | Some("asc") | Some("ascending") => 1,
        _ => -1,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn checked_field(field: &str) -> Result<&str, AppError> {
    let field = field.trim();
    if field.is_empty() || field.starts_with('$') {
        return Err(AppError::bad_request(format!("invalid field name: {:?}", field)));
    }
    Ok(field)
}

fn split_fields(fields: Option<&str>) -> Result<Vec<&str>, AppError> {
    let Some(fields) = fields else {
        return Ok(Vec::new());
    };
    fields
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(checked_field)
        .collect()
}

/// `$or` of one escaped, case-insensitive regex per field.
fn search_clause(q: &str, fields: &[&str]) -> Document {
    let pattern = regex::escape(q);
    let clauses: Vec<Bson> = fields
        .iter()
        .map(|field| Bson::Document(doc! { *field: { "$regex": &pattern, "$options": "i" } }))
        .collect();
    doc! { "$or": clauses }
}

fn equality_params(params: &QueryParams) -> Result<Option<(&str, &str)>, AppError> {
    match (params.filter.as_deref(), params.equal.as_deref()) {
        (Some(field), Some(value)) => Ok(Some((checked_field(field)?, value))),
        (None, None) => Ok(None),
        _ => Err(AppError::bad_request("filter and equal must be given together")),
    }
}

/// Query strings are untyped, so the raw value also matches the boolean or number it
/// spells. String comparison stays case-sensitive.
fn equality_clause(field: &str, value: &str) -> Document {
    let mut candidates = vec![Bson::String(value.to_string())];
    if let Some(flag) = parse_bool(value) {
        candidates.push(Bson::Boolean(flag));
    } else if let Ok(number) = value.trim().parse::<i64>() {
        candidates.push(Bson::Int64(number));
    } else if let Ok(number) = value.trim().parse::<f64>() {
        if number.is_finite() {
            candidates.push(Bson::Double(number));
        }
    }
    doc! { field: { "$in": candidates } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const CLIENTS: QueryConfig = QueryConfig::searching(&["name"]);

    fn engine() -> QueryEngine {
        QueryEngine::new(
            Collection::new(Arc::new(MemoryStore::new()), "clients"),
            CLIENTS,
        )
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        let mut params = QueryParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "page" => params.page = value,
                "items" => params.items = value,
                "sortBy" => params.sort_by = value,
                "sortValue" => params.sort_value = value,
                "sort" => params.sort = value,
                "q" => params.q = value,
                "fields" => params.fields = value,
                "filter" => params.filter = value,
                "equal" => params.equal = value,
                "enabled" => params.enabled = value,
                other => panic!("unknown parameter {}", other),
            }
        }
        params
    }

    async fn seed(engine: &QueryEngine, count: i32) {
        for n in 0..count {
            engine
                .collection()
                .insert(doc! {
                    "name": format!("Client {:02}", n),
                    "n": n,
                    "enabled": n % 2 == 0,
                    "country": if n < 5 { "FR" } else { "DE" },
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn second_page_of_twenty_five() {
        let engine = engine();
        seed(&engine, 25).await;

        let page = engine
            .list(&params(&[("page", "2"), ("items", "10")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();

        assert_eq!(page.result.len(), 10);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 2,
                pages: 3,
                count: 25
            }
        );
    }

    #[tokio::test]
    async fn empty_collection_lists_as_empty() {
        let engine = engine();
        assert_eq!(
            engine.list(&QueryParams::default()).await.unwrap(),
            Outcome::Empty
        );
        assert_eq!(
            engine.list_all(&QueryParams::default()).await.unwrap(),
            Outcome::Empty
        );
    }

    #[tokio::test]
    async fn page_past_the_end_is_ok_and_empty() {
        let engine = engine();
        seed(&engine, 3).await;

        let page = engine
            .list(&params(&[("page", "9")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert!(page.result.is_empty());
        assert_eq!(page.pagination.count, 3);
    }

    #[tokio::test]
    async fn list_sorts_by_requested_field() {
        let engine = engine();
        seed(&engine, 5).await;

        let page = engine
            .list(&params(&[("sortBy", "n"), ("sortValue", "1"), ("items", "2")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        let ns: Vec<i32> = page.result.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(ns, vec![0, 1]);
    }

    #[tokio::test]
    async fn list_searches_only_with_q_and_fields() {
        let engine = engine();
        seed(&engine, 12).await;

        let narrowed = engine
            .list(&params(&[("q", "client 1"), ("fields", "name,email")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        // "Client 10" and "Client 11"
        assert_eq!(narrowed.pagination.count, 2);

        let unfiltered = engine
            .list(&params(&[("q", "client 1")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(unfiltered.pagination.count, 12);
    }

    #[tokio::test]
    async fn removed_documents_are_invisible() {
        let engine = engine();
        seed(&engine, 2).await;
        let victim = engine
            .collection()
            .find_one(doc! { "n": 0 })
            .await
            .unwrap()
            .unwrap();
        engine
            .collection()
            .soft_delete(victim.get_str("_id").unwrap())
            .await
            .unwrap();

        let all = engine
            .list_all(&QueryParams::default())
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn list_all_filters_on_enabled() {
        let engine = engine();
        seed(&engine, 6).await;

        let enabled = engine
            .list_all(&params(&[("enabled", "true"), ("sort", "asc")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(enabled.len(), 3);
        assert!(enabled.iter().all(|d| d.get_bool("enabled").unwrap()));
    }

    #[tokio::test]
    async fn blank_search_is_not_found() {
        let engine = engine();
        seed(&engine, 2).await;

        for q in ["", "   "] {
            assert!(matches!(
                engine.search(&params(&[("q", q)])).await.unwrap(),
                Outcome::NotFound(_)
            ));
        }
        assert!(matches!(
            engine.search(&QueryParams::default()).await.unwrap(),
            Outcome::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn search_defaults_fields_and_caps_results() {
        let engine = engine();
        seed(&engine, 25).await;

        let found = engine
            .search(&params(&[("q", "  CLIENT ")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(found.len(), SEARCH_LIMIT as usize);

        assert!(matches!(
            engine.search(&params(&[("q", "nobody")])).await.unwrap(),
            Outcome::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn search_escapes_regex_metacharacters() {
        let engine = engine();
        engine
            .collection()
            .insert(doc! { "name": "A+B (Holdings)" })
            .await
            .unwrap();

        let found = engine
            .search(&params(&[("q", "a+b (")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn filter_requires_both_parameters() {
        let engine = engine();
        for partial in [params(&[("filter", "country")]), params(&[("equal", "FR")])] {
            assert!(matches!(
                engine.filter(&partial).await,
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(matches!(
            engine.filter(&QueryParams::default()).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn filter_is_case_sensitive_and_typed() {
        let engine = engine();
        seed(&engine, 10).await;

        let french = engine
            .filter(&params(&[("filter", "country"), ("equal", "FR")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(french.len(), 5);

        let lower = engine
            .filter(&params(&[("filter", "country"), ("equal", "fr")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert!(lower.is_empty());

        let enabled = engine
            .filter(&params(&[("filter", "enabled"), ("equal", "true")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(enabled.len(), 5);

        let seventh = engine
            .filter(&params(&[("filter", "n"), ("equal", "7")]))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(seventh.len(), 1);
    }

    #[tokio::test]
    async fn filter_rejects_operator_fields() {
        let engine = engine();
        assert!(matches!(
            engine
                .filter(&params(&[("filter", "$where"), ("equal", "1")]))
                .await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn summary_counts_all_and_filtered() {
        let engine = engine();
        assert_eq!(
            engine.summary(&QueryParams::default()).await.unwrap(),
            Outcome::Empty
        );

        seed(&engine, 10).await;
        let summary = engine
            .summary(&params(&[("filter", "country"), ("equal", "DE")]))
            .await
            .unwrap();
        assert_eq!(
            summary,
            Outcome::Ok(Summary {
                count_filter: 5,
                count_all_docs: 10
            })
        );
    }

    #[tokio::test]
    async fn summary_with_no_matching_rows_is_not_empty() {
        let engine = engine();
        seed(&engine, 4).await;

        let summary = engine
            .summary(&params(&[("filter", "country"), ("equal", "JP")]))
            .await
            .unwrap();
        assert_eq!(
            summary,
            Outcome::Ok(Summary {
                count_filter: 0,
                count_all_docs: 4
            })
        );
    }

    #[tokio::test]
    async fn summary_rejects_half_a_filter() {
        let engine = engine();
        seed(&engine, 1).await;
        assert!(matches!(
            engine.summary(&params(&[("filter", "country")])).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
