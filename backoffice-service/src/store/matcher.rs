//! Evaluation of the MongoDB query dialect used by the service, for [`MemoryStore`].
//!
//! Supported: field equality (array fields match any element), `$or`, `$and`,
//! `$eq`/`$ne`/`$in`/`$nin`/`$gt`/`$gte`/`$lt`/`$lte`/`$exists`/`$regex`+`$options`;
//! updates `$set`/`$unset`/`$inc`/`$push`; pipeline stages `$match`, `$group` (with
//! `$sum`), `$count`, `$sort`, `$skip`, `$limit`.
//!
//! [`MemoryStore`]: super::MemoryStore

use mongodb::bson::{Bson, Document};
use regex::RegexBuilder;
use service_core::error::AppError;
use std::cmp::Ordering;

fn unsupported(what: &str, name: &str) -> AppError {
    AppError::bad_request(format!("unsupported {} '{}'", what, name))
}

/// Resolve a possibly dotted path.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Numeric view of a BSON value.
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over BSON values following MongoDB's cross-type ordering.
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Equality with numeric types compared by value.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn field_equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(actual) => values_equal(actual, expected),
    }
}

fn is_operator_document(value: &Bson) -> Option<&Document> {
    match value {
        Bson::Document(inner) if inner.keys().next().is_some_and(|k| k.starts_with('$')) => {
            Some(inner)
        }
        _ => None,
    }
}

fn ordered(value: Option<&Bson>, bound: &Bson, accept: fn(Ordering) -> bool) -> bool {
    match value {
        // Comparisons only match within the same type bracket.
        Some(actual) if type_rank(actual) == type_rank(bound) => accept(compare(actual, bound)),
        _ => false,
    }
}

fn array_operand<'a>(operator: &str, operand: &'a Bson) -> Result<&'a Vec<Bson>, AppError> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(AppError::bad_request(format!("{} needs an array", operator))),
    }
}

fn regex_matches(value: Option<&Bson>, pattern: &str, options: &str) -> Result<bool, AppError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .build()
        .map_err(|e| AppError::bad_request(format!("invalid $regex: {}", e)))?;

    Ok(match value {
        Some(Bson::String(text)) => regex.is_match(text),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(text) if regex.is_match(text))),
        _ => false,
    })
}

fn operators_match(value: Option<&Bson>, operators: &Document) -> Result<bool, AppError> {
    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => field_equals(value, operand),
            "$ne" => !field_equals(value, operand),
            "$in" => array_operand(operator, operand)?
                .iter()
                .any(|candidate| field_equals(value, candidate)),
            "$nin" => !array_operand(operator, operand)?
                .iter()
                .any(|candidate| field_equals(value, candidate)),
            "$gt" => ordered(value, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(value, operand, |o| o != Ordering::Less),
            "$lt" => ordered(value, operand, |o| o == Ordering::Less),
            "$lte" => ordered(value, operand, |o| o != Ordering::Greater),
            "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| AppError::bad_request("$regex needs a string"))?;
                let options = operators.get_str("$options").unwrap_or("");
                regex_matches(value, pattern, options)?
            }
            "$options" => true,
            other => return Err(unsupported("query operator", other)),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(operator: &str, operand: &'a Bson) -> Result<Vec<&'a Document>, AppError> {
    array_operand(operator, operand)?
        .iter()
        .map(|clause| {
            clause
                .as_document()
                .ok_or_else(|| AppError::bad_request(format!("{} clauses must be documents", operator)))
        })
        .collect()
}

/// Whether `document` satisfies `filter`.
pub fn matches(document: &Document, filter: &Document) -> Result<bool, AppError> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$or" => {
                let mut any = false;
                for clause in sub_filters(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for clause in sub_filters(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            other if other.starts_with('$') => return Err(unsupported("query operator", other)),
            field => {
                let value = lookup(document, field);
                match is_operator_document(condition) {
                    Some(operators) => operators_match(value, operators)?,
                    None => field_equals(value, condition),
                }
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn add_numbers(current: Option<&Bson>, delta: &Bson) -> Result<Bson, AppError> {
    let delta_value =
        as_f64(delta).ok_or_else(|| AppError::bad_request("$inc needs a numeric operand"))?;
    match current {
        None | Some(Bson::Null) => Ok(delta.clone()),
        Some(Bson::Int32(a)) if !matches!(delta, Bson::Double(_)) => {
            Ok(Bson::Int64(i64::from(*a) + delta_value as i64))
        }
        Some(Bson::Int64(a)) if !matches!(delta, Bson::Double(_)) => {
            Ok(Bson::Int64(a + delta_value as i64))
        }
        Some(existing) => {
            let base = as_f64(existing)
                .ok_or_else(|| AppError::bad_request("$inc applied to a non-numeric field"))?;
            Ok(Bson::Double(base + delta_value))
        }
    }
}

/// Apply an update document (`$set`, `$unset`, `$inc`, `$push`) in place.
pub fn apply_update(document: &mut Document, update: &Document) -> Result<(), AppError> {
    for (operator, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| AppError::bad_request(format!("{} needs a document", operator)))?;
        for (field, operand) in fields {
            match operator.as_str() {
                "$set" => {
                    document.insert(field.clone(), operand.clone());
                }
                "$unset" => {
                    document.remove(field);
                }
                "$inc" => {
                    let next = add_numbers(document.get(field), operand)?;
                    document.insert(field.clone(), next);
                }
                "$push" => match document.get_mut(field) {
                    Some(Bson::Array(items)) => items.push(operand.clone()),
                    None => {
                        document.insert(field.clone(), Bson::Array(vec![operand.clone()]));
                    }
                    Some(_) => {
                        return Err(AppError::bad_request(format!(
                            "$push target '{}' is not an array",
                            field
                        )))
                    }
                },
                other => return Err(unsupported("update operator", other)),
            }
        }
    }
    Ok(())
}

/// Order documents by a sort specification (`{field: 1 | -1, ...}`), stably.
pub fn sort_documents(documents: &mut [Document], sort: &Document) {
    let keys: Vec<(&str, bool)> = sort
        .iter()
        .map(|(field, direction)| {
            let descending = as_f64(direction).is_some_and(|d| d < 0.0);
            (field.as_str(), descending)
        })
        .collect();

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = lookup(a, field).unwrap_or(&Bson::Null);
            let right = lookup(b, field).unwrap_or(&Bson::Null);
            let ordering = compare(left, right);
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn resolve_expression(document: &Document, expression: &Bson) -> Bson {
    match expression {
        Bson::String(path) if path.starts_with('$') => {
            lookup(document, &path[1..]).cloned().unwrap_or(Bson::Null)
        }
        other => other.clone(),
    }
}

#[derive(Default)]
struct Sum {
    integral: i64,
    fractional: f64,
    saw_double: bool,
}

impl Sum {
    fn add(&mut self, value: &Bson) {
        match value {
            Bson::Int32(v) => self.integral += i64::from(*v),
            Bson::Int64(v) => self.integral += v,
            Bson::Double(v) => {
                self.fractional += v;
                self.saw_double = true;
            }
            _ => {}
        }
    }

    fn finish(&self) -> Bson {
        if self.saw_double {
            Bson::Double(self.integral as f64 + self.fractional)
        } else {
            Bson::Int64(self.integral)
        }
    }
}

fn group(documents: Vec<Document>, spec: &Document) -> Result<Vec<Document>, AppError> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| AppError::bad_request("$group needs an _id"))?;

    let mut accumulators = Vec::new();
    for (name, accumulator) in spec.iter().filter(|(name, _)| name.as_str() != "_id") {
        let accumulator = accumulator
            .as_document()
            .ok_or_else(|| AppError::bad_request("$group accumulators must be documents"))?;
        let expression = match accumulator.get("$sum") {
            Some(expression) => expression.clone(),
            None => {
                let operator = accumulator.keys().next().map(String::as_str).unwrap_or("");
                return Err(unsupported("accumulator", operator));
            }
        };
        accumulators.push((name.clone(), expression));
    }

    let mut groups: Vec<(Bson, Vec<Sum>)> = Vec::new();
    for document in &documents {
        let key = resolve_expression(document, key_expression);
        let index = match groups.iter().position(|(existing, _)| values_equal(existing, &key)) {
            Some(index) => index,
            None => {
                groups.push((key, accumulators.iter().map(|_| Sum::default()).collect()));
                groups.len() - 1
            }
        };
        for ((_, expression), sum) in accumulators.iter().zip(groups[index].1.iter_mut()) {
            sum.add(&resolve_expression(document, expression));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, sums)| {
            let mut row = Document::new();
            row.insert("_id", key);
            for ((name, _), sum) in accumulators.iter().zip(sums.iter()) {
                row.insert(name.clone(), sum.finish());
            }
            row
        })
        .collect())
}

/// Run an aggregation pipeline over an in-memory set of documents.
pub fn aggregate(
    mut documents: Vec<Document>,
    pipeline: &[Document],
) -> Result<Vec<Document>, AppError> {
    for stage in pipeline {
        let (name, spec) = stage
            .iter()
            .next()
            .ok_or_else(|| AppError::bad_request("empty pipeline stage"))?;
        documents = match name.as_str() {
            "$match" => {
                let filter = spec
                    .as_document()
                    .ok_or_else(|| AppError::bad_request("$match needs a document"))?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$group" => {
                let spec = spec
                    .as_document()
                    .ok_or_else(|| AppError::bad_request("$group needs a document"))?;
                group(documents, spec)?
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .ok_or_else(|| AppError::bad_request("$count needs a field name"))?;
                // An empty input produces no row at all, as MongoDB does.
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut row = Document::new();
                    row.insert(field, Bson::Int32(documents.len() as i32));
                    vec![row]
                }
            }
            "$sort" => {
                let sort = spec
                    .as_document()
                    .ok_or_else(|| AppError::bad_request("$sort needs a document"))?;
                sort_documents(&mut documents, sort);
                documents
            }
            "$skip" => {
                let skip = as_f64(spec).unwrap_or(0.0).max(0.0) as usize;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => {
                let limit = as_f64(spec).unwrap_or(0.0).max(0.0) as usize;
                documents.truncate(limit);
                documents
            }
            other => return Err(unsupported("pipeline stage", other)),
        };
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn or_of_case_insensitive_regexes() {
        let document = doc! { "name": "Acme Corp", "email": "sales@acme.test" };
        let filter = doc! {
            "$or": [
                { "name": { "$regex": "corp", "$options": "i" } },
                { "email": { "$regex": "nomatch", "$options": "i" } },
            ]
        };
        assert!(matches(&document, &filter).unwrap());

        let miss = doc! { "$or": [ { "name": { "$regex": "CORP" } } ] };
        assert!(!matches(&document, &miss).unwrap());
    }

    #[test]
    fn equality_is_numeric_across_integer_and_double() {
        let document = doc! { "amount": 500_i32 };
        assert!(matches(&document, &doc! { "amount": 500.0 }).unwrap());
        assert!(matches(&document, &doc! { "amount": { "$in": ["500", 500.0] } }).unwrap());
    }

    #[test]
    fn missing_field_equals_null_only() {
        let document = doc! { "name": "x" };
        assert!(matches(&document, &doc! { "enabled": Bson::Null }).unwrap());
        assert!(!matches(&document, &doc! { "enabled": true }).unwrap());
        assert!(matches(&document, &doc! { "enabled": { "$ne": true } }).unwrap());
    }

    #[test]
    fn array_fields_match_any_element() {
        let document = doc! { "payment": ["p1", "p2"] };
        assert!(matches(&document, &doc! { "payment": "p2" }).unwrap());
    }

    #[test]
    fn unsupported_operator_is_rejected() {
        let result = matches(&doc! { "a": 1 }, &doc! { "a": { "$where": "x" } });
        assert!(result.is_err());
    }

    #[test]
    fn update_operators_apply_in_place() {
        let mut document = doc! { "credit": 100_i32, "payment": [] };
        apply_update(
            &mut document,
            &doc! {
                "$inc": { "credit": 50.5 },
                "$push": { "payment": "p1" },
                "$set": { "paymentStatus": "partially" },
            },
        )
        .unwrap();

        assert_eq!(document.get_f64("credit").unwrap(), 150.5);
        assert_eq!(document.get_array("payment").unwrap().len(), 1);
        assert_eq!(document.get_str("paymentStatus").unwrap(), "partially");
    }

    #[test]
    fn count_stage_emits_nothing_for_empty_input() {
        let rows = aggregate(
            vec![doc! { "a": 1 }],
            &[doc! { "$match": { "a": 2 } }, doc! { "$count": "count" }],
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn group_sums_by_key() {
        let documents = vec![
            doc! { "status": "paid", "total": 10.0 },
            doc! { "status": "unpaid", "total": 5.0 },
            doc! { "status": "paid", "total": 2.5 },
        ];
        let rows = aggregate(
            documents,
            &[
                doc! { "$group": { "_id": "$status", "count": { "$sum": 1 }, "total": { "$sum": "$total" } } },
                doc! { "$sort": { "_id": 1 } },
            ],
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("_id").unwrap(), "paid");
        assert_eq!(rows[0].get_i64("count").unwrap(), 2);
        assert_eq!(rows[0].get_f64("total").unwrap(), 12.5);
    }

    #[test]
    fn sort_is_stable_and_descending_when_negative() {
        let mut documents = vec![
            doc! { "n": 1, "tag": "a" },
            doc! { "n": 3, "tag": "b" },
            doc! { "n": 1, "tag": "c" },
        ];
        sort_documents(&mut documents, &doc! { "n": -1 });
        let tags: Vec<&str> = documents.iter().map(|d| d.get_str("tag").unwrap()).collect();
        assert_eq!(tags, vec!["b", "a", "c"]);
    }
}
