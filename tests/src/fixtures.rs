//! Test fixtures and order generators.

use serde_json::{json, Value};
use uuid::Uuid;

/// Order body keyed by `orderID`.
pub fn order(id: &str, total: i64) -> Value {
    json!({ "orderID": id, "total": total })
}

/// Order body with a random `orderID`.
pub fn random_order() -> Value {
    order(&format!("ORD-{}", Uuid::new_v4().simple()), 10)
}

/// Generate N orders with distinct ids.
pub fn orders(n: usize) -> Vec<Value> {
    (0..n).map(|i| order(&format!("ORD-{:04}", i), i as i64)).collect()
}

/// Order body without any key field.
pub fn unkeyed_order(total: i64) -> Value {
    json!({ "total": total, "items": ["widget"] })
}

/// A body that is not JSON at all.
pub fn malformed_body() -> &'static str {
    "not-json"
}
