//! Evaluates where clauses against documents that were already fetched.
//!
//! This is how a merged batch read is split back into the results of the
//! individual requests.

use serde_json::{Map, Value};
use std::cmp::Ordering;

const SQL_DATABASES: &[&str] = &["postgres", "mysql", "sqlserver"];

fn is_sql(db_type: &str) -> bool {
    SQL_DATABASES.contains(&db_type)
}

/// Returns whether `doc` satisfies `clause`.
///
/// Arrays of documents match when every element matches.
pub fn matches(db_type: &str, clause: &Map<String, Value>, doc: &Value) -> bool {
    match doc {
        Value::Object(obj) => matches_object(db_type, clause, obj),
        Value::Array(docs) => docs.iter().all(|d| matches(db_type, clause, d)),
        _ => false,
    }
}

fn matches_object(db_type: &str, clause: &Map<String, Value>, doc: &Map<String, Value>) -> bool {
    for (key, cond) in clause {
        if key.starts_with("$or") {
            let Value::Array(alternatives) = cond else {
                return false;
            };
            let any = alternatives.iter().any(|alt| match alt {
                Value::Object(alt) => matches_object(db_type, alt, doc),
                _ => false,
            });
            if !any {
                return false;
            }
            continue;
        }

        let field = lookup(doc, key);
        let ok = match cond {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops
                .iter()
                .all(|(op, operand)| apply(db_type, op, operand, field)),
            _ => field.is_some_and(|v| equals(db_type, v, cond)),
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Resolves a dotted path such as `author.address.city`.
fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn apply(db_type: &str, op: &str, operand: &Value, field: Option<&Value>) -> bool {
    match op {
        "$exists" => field.is_some() == operand.as_bool().unwrap_or(true),
        "$ne" => !field.is_some_and(|v| equals(db_type, v, operand)),
        "$nin" => match (operand, field) {
            (Value::Array(set), Some(v)) => !set.iter().any(|o| equals(db_type, v, o)),
            (Value::Array(_), None) => true,
            _ => false,
        },
        _ => {
            let Some(value) = field else {
                return false;
            };
            match op {
                "$eq" => equals(db_type, value, operand),
                "$gt" => compare(db_type, value, operand) == Some(Ordering::Greater),
                "$gte" => matches!(
                    compare(db_type, value, operand),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                "$lt" => compare(db_type, value, operand) == Some(Ordering::Less),
                "$lte" => matches!(
                    compare(db_type, value, operand),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                "$in" => match operand {
                    Value::Array(set) => set.iter().any(|o| equals(db_type, value, o)),
                    _ => false,
                },
                "$contains" => contains(db_type, value, operand),
                _ => false,
            }
        }
    }
}

fn as_number(db_type: &str, value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if is_sql(db_type) => s.parse().ok(),
        _ => None,
    }
}

fn equals(db_type: &str, left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(db_type, left), as_number(db_type, right)) {
        return l == r;
    }
    left == right
}

fn compare(db_type: &str, left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (as_number(db_type, left), as_number(db_type, right)) {
        return l.partial_cmp(&r);
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// Arrays contain an element, objects contain a subset of fields and
/// strings contain a substring.
fn contains(db_type: &str, value: &Value, operand: &Value) -> bool {
    match (value, operand) {
        (Value::Array(items), Value::Array(wanted)) => wanted
            .iter()
            .all(|w| items.iter().any(|i| contains(db_type, i, w))),
        (Value::Array(items), wanted) => items.iter().any(|i| contains(db_type, i, wanted)),
        (Value::Object(obj), Value::Object(wanted)) => wanted.iter().all(|(k, w)| {
            obj.get(k).is_some_and(|v| contains(db_type, v, w))
        }),
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (v, w) => equals(db_type, v, w),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_implicit_equality_and_paths() {
        let doc = json!({"id": 1, "author": {"name": "ada", "tags": ["x", "y"]}});
        assert!(matches("mongo", &clause(json!({"id": 1})), &doc));
        assert!(matches("mongo", &clause(json!({"author.name": "ada"})), &doc));
        assert!(matches("mongo", &clause(json!({"author.tags.1": "y"})), &doc));
        assert!(!matches("mongo", &clause(json!({"author.name": "bob"})), &doc));
        assert!(!matches("mongo", &clause(json!({"missing": 1})), &doc));
        assert!(matches("mongo", &clause(json!({})), &doc));
        assert!(!matches("mongo", &clause(json!({"id": 1})), &json!("scalar")));
    }

    #[test]
    fn test_comparison_operators() {
        let doc = json!({"age": 30, "name": "m"});
        let cases = [
            (json!({"age": {"$gt": 29}}), true),
            (json!({"age": {"$gt": 30}}), false),
            (json!({"age": {"$gte": 30, "$lte": 30}}), true),
            (json!({"age": {"$lt": 30}}), false),
            (json!({"age": {"$ne": 31}}), true),
            (json!({"age": {"$eq": 30.0}}), true),
            (json!({"age": {"$in": [1, 30]}}), true),
            (json!({"age": {"$nin": [1, 30]}}), false),
            (json!({"name": {"$gt": "a"}}), true),
            (json!({"age": {"$unknown": 1}}), false),
            (json!({"nick": {"$exists": false}}), true),
            (json!({"name": {"$exists": true}}), true),
            (json!({"nick": {"$ne": "x"}}), true),
        ];
        for (c, expected) in cases {
            assert_eq!(matches("mongo", &clause(c.clone()), &doc), expected, "{c}");
        }
    }

    #[test]
    fn test_sql_numeric_strings() {
        let doc = json!({"id": "42", "price": "9.5"});
        assert!(matches("postgres", &clause(json!({"id": 42})), &doc));
        assert!(matches("mysql", &clause(json!({"price": {"$lt": 10}})), &doc));
        assert!(!matches("mongo", &clause(json!({"id": 42})), &doc));
    }

    #[test]
    fn test_contains() {
        let doc = json!({"tags": ["a", "b"], "meta": {"k": 1, "j": 2}, "title": "hello world"});
        assert!(matches("mongo", &clause(json!({"tags": {"$contains": "a"}})), &doc));
        assert!(matches("mongo", &clause(json!({"tags": {"$contains": ["a", "b"]}})), &doc));
        assert!(!matches("mongo", &clause(json!({"tags": {"$contains": ["c"]}})), &doc));
        assert!(matches("mongo", &clause(json!({"meta": {"$contains": {"k": 1}}})), &doc));
        assert!(matches("mongo", &clause(json!({"title": {"$contains": "world"}})), &doc));
    }

    #[test]
    fn test_or_clauses() {
        let doc = json!({"id": 2, "kind": "post"});
        let c = clause(json!({"$or": [{"id": 1}, {"id": 2}]}));
        assert!(matches("mongo", &c, &doc));

        let c = clause(json!({"kind": "post", "$or:0": [{"id": 1}], "$or:1": [{"id": 2}]}));
        assert!(!matches("mongo", &c, &doc));

        let c = clause(json!({"kind": "page", "$or": [{"id": 2}]}));
        assert!(!matches("mongo", &c, &doc));

        assert!(!matches("mongo", &clause(json!({"$or": {"id": 2}})), &doc));
    }

    #[test]
    fn test_array_of_docs() {
        let docs = json!([{"a": 1}, {"a": 1, "b": 2}]);
        assert!(matches("mongo", &clause(json!({"a": 1})), &docs));
        assert!(!matches("mongo", &clause(json!({"b": 2})), &docs));
    }
}
