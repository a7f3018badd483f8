//! In-process gateway
//!
//! Holds every table in memory and publishes row changes on a broadcast bus,
//! so feed logic can run end to end without the managed platform.
//! Failures can be injected per table, per procedure, for uploads and for
//! profile updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use shared::client::UserMetadata;
use shared::models::ToggleLikeArgs;
use shared::{ChangeEvent, ChangeKind, EventMask, GeoPoint, RowId, Table, UserInfo};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{Filter, Gateway, Query};
use crate::error::{ClientError, ClientResult};
use crate::realtime::{RealtimeConfig, Subscription};

/// Change bus capacity
const BUS_CAPACITY: usize = 1024;

/// Default search radius of `find_nearby_issues`
pub const DEFAULT_NEARBY_RADIUS_M: f64 = 100.0;

#[derive(Debug, Default)]
struct FailurePlan {
    queries: HashMap<Table, usize>,
    writes: HashMap<Table, usize>,
    calls: HashMap<String, usize>,
    uploads: usize,
    user_updates: usize,
}

fn take_failure<K: std::hash::Hash + Eq>(plan: &mut HashMap<K, usize>, key: &K) -> bool {
    match plan.get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[derive(Debug)]
struct Inner {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    users: Mutex<HashMap<String, UserInfo>>,
    bus: broadcast::Sender<ChangeEvent>,
    failures: Mutex<FailurePlan>,
    query_counts: Mutex<HashMap<Table, usize>>,
    calls: Mutex<Vec<(String, Value)>>,
    nearby_radius_m: f64,
    channel_buffer: usize,
}

/// In-memory [`Gateway`]
///
/// Cloning shares the same tables and change bus.
#[derive(Debug, Clone)]
pub struct MemoryGateway {
    inner: Arc<Inner>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_NEARBY_RADIUS_M, RealtimeConfig::default().channel_buffer)
    }

    /// Gateway with a custom `find_nearby_issues` radius and subscription buffer
    pub fn with_settings(nearby_radius_m: f64, channel_buffer: usize) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(HashMap::new()),
                objects: Mutex::new(HashMap::new()),
                users: Mutex::new(HashMap::new()),
                bus,
                failures: Mutex::new(FailurePlan::default()),
                query_counts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                nearby_radius_m,
                channel_buffer: channel_buffer.max(1),
            }),
        }
    }

    // ========== Fixtures ==========

    /// Store rows directly, without change events
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.inner.tables.lock();
        tables.entry(table).or_default().extend(rows);
    }

    /// Current rows of `table`
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.inner.tables.lock().get(&table).cloned().unwrap_or_default()
    }

    /// Publish a change event as if another client had written it
    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error
        let _ = self.inner.bus.send(event);
    }

    /// Stored object bytes
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.inner.objects.lock().get(&object_key(bucket, path)).cloned()
    }

    /// Register an auth user
    pub fn seed_user(&self, user: UserInfo) {
        self.inner.users.lock().insert(user.id.clone(), user);
    }

    /// Auth user as currently stored
    pub fn user(&self, id: &str) -> Option<UserInfo> {
        self.inner.users.lock().get(id).cloned()
    }

    // ========== Failure injection ==========

    /// Fail the next `times` queries on `table`
    pub fn fail_queries(&self, table: Table, times: usize) {
        *self.inner.failures.lock().queries.entry(table).or_default() += times;
    }

    /// Fail the next `times` inserts/updates on `table`
    pub fn fail_writes(&self, table: Table, times: usize) {
        *self.inner.failures.lock().writes.entry(table).or_default() += times;
    }

    /// Fail the next `times` calls of procedure `name`
    pub fn fail_calls(&self, name: &str, times: usize) {
        *self.inner.failures.lock().calls.entry(name.to_string()).or_default() += times;
    }

    /// Fail the next `times` uploads
    pub fn fail_uploads(&self, times: usize) {
        self.inner.failures.lock().uploads += times;
    }

    /// Fail the next `times` profile metadata updates
    pub fn fail_user_updates(&self, times: usize) {
        self.inner.failures.lock().user_updates += times;
    }

    // ========== Inspection ==========

    /// Number of queries issued against `table`, failed ones included
    pub fn query_count(&self, table: Table) -> usize {
        self.inner.query_counts.lock().get(&table).copied().unwrap_or(0)
    }

    /// Procedure calls in order, with their arguments
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.inner.calls.lock().clone()
    }

    /// Open change feed subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.bus.receiver_count()
    }

    // ========== Procedures ==========

    fn toggle_like(&self, args: Value) -> ClientResult<Value> {
        let args: ToggleLikeArgs =
            serde_json::from_value(args).map_err(|e| ClientError::call("toggle_like", e))?;
        let issue_id = Value::String(args.p_issue_id.to_string());
        let user_id = Value::String(args.p_user_id.clone());

        let event = {
            let mut tables = self.inner.tables.lock();
            let likes = tables.entry(Table::IssueLikes).or_default();
            let existing = likes.iter().position(|row| {
                row.get("issue_id").is_some_and(|v| values_equal(v, &issue_id))
                    && row.get("user_id").is_some_and(|v| values_equal(v, &user_id))
            });
            match existing {
                Some(index) => {
                    let removed = likes.remove(index);
                    ChangeEvent::new(Table::IssueLikes, ChangeKind::Delete, Value::Null).with_old_record(removed)
                }
                None => {
                    let row = json!({
                        "id": Uuid::new_v4().to_string(),
                        "issue_id": issue_id,
                        "user_id": user_id,
                        "created_at": Utc::now().to_rfc3339(),
                    });
                    likes.push(row.clone());
                    ChangeEvent::new(Table::IssueLikes, ChangeKind::Insert, row)
                }
            }
        };

        tracing::debug!(issue_id = %args.p_issue_id, kind = %event.kind, "toggle_like applied");
        self.publish(event);
        Ok(Value::Null)
    }

    fn find_nearby_issues(&self, args: Value) -> ClientResult<Value> {
        let coordinate = |key: &str| {
            args.get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| ClientError::call("find_nearby_issues", format!("missing {key}")))
        };
        let origin = GeoPoint::new(coordinate("lat_query")?, coordinate("lng_query")?);

        let tables = self.inner.tables.lock();
        let mut nearby: Vec<(f64, Value)> = tables
            .get(&Table::Issues)
            .into_iter()
            .flatten()
            .filter_map(|row| {
                let point: GeoPoint = row.get("location")?.as_str()?.parse().ok()?;
                let distance = origin.distance_m(&point);
                (distance <= self.inner.nearby_radius_m).then(|| {
                    (
                        distance,
                        json!({ "id": row.get("id"), "title": row.get("title"), "distance_m": distance }),
                    )
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        Ok(Value::Array(nearby.into_iter().map(|(_, row)| row).collect()))
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn query(&self, query: &Query) -> ClientResult<Vec<Value>> {
        *self.inner.query_counts.lock().entry(query.table).or_default() += 1;
        if take_failure(&mut self.inner.failures.lock().queries, &query.table) {
            return Err(ClientError::fetch(query.table, "injected failure"));
        }

        let tables = self.inner.tables.lock();
        let mut rows: Vec<Value> = tables
            .get(&query.table)
            .into_iter()
            .flatten()
            .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
            .cloned()
            .collect();

        // Stable: equal keys keep insertion order
        rows.sort_by(|a, b| {
            query.order.iter().fold(Ordering::Equal, |acc, order| {
                acc.then_with(|| {
                    compare_fields(a.get(&order.column), b.get(&order.column), order.ascending)
                })
            })
        });

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        let rows = rows
            .into_iter()
            .map(|row| {
                let mut out = if query.columns.is_empty() {
                    row.as_object().cloned().unwrap_or_default()
                } else {
                    query
                        .columns
                        .iter()
                        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                        .collect::<Map<String, Value>>()
                };
                for count in &query.counts {
                    let n = match row.get("id") {
                        Some(id) => tables
                            .get(&count.table)
                            .map(|related| {
                                related
                                    .iter()
                                    .filter(|r| r.get(count.foreign_key).is_some_and(|v| values_equal(v, id)))
                                    .count()
                            })
                            .unwrap_or(0),
                        None => 0,
                    };
                    out.insert(count.table.to_string(), json!([{ "count": n }]));
                }
                Value::Object(out)
            })
            .collect();

        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> ClientResult<Value> {
        if take_failure(&mut self.inner.failures.lock().writes, &table) {
            return Err(ClientError::write(table, "injected failure"));
        }
        let Value::Object(mut fields) = row else {
            return Err(ClientError::write(table, "row must be a JSON object"));
        };

        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        let row = Value::Object(fields);

        {
            let mut tables = self.inner.tables.lock();
            let rows = tables.entry(table).or_default();
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            if rows.iter().any(|r| r.get("id").is_some_and(|v| values_equal(v, &id))) {
                return Err(ClientError::write(table, format!("duplicate id {id}")));
            }
            rows.push(row.clone());
        }

        tracing::debug!(table = %table, "Row inserted");
        self.publish(ChangeEvent::new(table, ChangeKind::Insert, row.clone()));
        Ok(row)
    }

    async fn update(&self, table: Table, id: &RowId, patch: Value) -> ClientResult<()> {
        if take_failure(&mut self.inner.failures.lock().writes, &table) {
            return Err(ClientError::write(table, "injected failure"));
        }
        let Value::Object(patch) = patch else {
            return Err(ClientError::write(table, "patch must be a JSON object"));
        };

        let target = Value::String(id.to_string());
        let (old, new) = {
            let mut tables = self.inner.tables.lock();
            let row = tables
                .get_mut(&table)
                .and_then(|rows| {
                    rows.iter_mut()
                        .find(|r| r.get("id").is_some_and(|v| values_equal(v, &target)))
                })
                .ok_or_else(|| ClientError::write(table, format!("no row with id {id}")))?;
            let old = row.clone();
            if let Value::Object(fields) = row {
                fields.extend(patch);
            }
            (old, row.clone())
        };

        tracing::debug!(table = %table, id = %id, "Row updated");
        self.publish(ChangeEvent::new(table, ChangeKind::Update, new).with_old_record(old));
        Ok(())
    }

    async fn remote_call(&self, name: &str, args: Value) -> ClientResult<Value> {
        self.inner.calls.lock().push((name.to_string(), args.clone()));
        if take_failure(&mut self.inner.failures.lock().calls, &name.to_string()) {
            return Err(ClientError::call(name, "injected failure"));
        }

        match name {
            "toggle_like" => self.toggle_like(args),
            "find_nearby_issues" => self.find_nearby_issues(args),
            _ => Err(ClientError::call(name, "unknown procedure")),
        }
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> ClientResult<String> {
        {
            let mut failures = self.inner.failures.lock();
            if failures.uploads > 0 {
                failures.uploads -= 1;
                return Err(ClientError::call("upload", "injected failure"));
            }
        }
        self.inner.objects.lock().insert(object_key(bucket, path), bytes);
        Ok(format!("memory://{}", object_key(bucket, path)))
    }

    async fn update_user(&self, user_id: &str, metadata: &UserMetadata) -> ClientResult<UserInfo> {
        {
            let mut failures = self.inner.failures.lock();
            if failures.user_updates > 0 {
                failures.user_updates -= 1;
                return Err(ClientError::write(Table::Users, "injected failure"));
            }
        }

        let mut users = self.inner.users.lock();
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserInfo::new(user_id));
        user.user_metadata = metadata.clone();

        tracing::debug!(user_id = %user_id, "User metadata updated");
        Ok(user.clone())
    }

    async fn subscribe(&self, table: Table, mask: EventMask) -> ClientResult<Subscription> {
        let mut bus = self.inner.bus.subscribe();

        Ok(Subscription::spawn(
            table,
            mask,
            self.inner.channel_buffer,
            move |tx, cancel| async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = bus.recv() => match received {
                            Ok(event) => {
                                if event.table != table || !mask.contains(event.kind) {
                                    continue;
                                }
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(table = %table, skipped, "Change bus lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            },
        ))
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path.trim_start_matches('/'))
}

// ============================================================================
// Row matching
// ============================================================================

/// Scalar as compared by the gateway: ids match whether sent as text or number
fn canonical(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (canonical(a), canonical(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        if let (Ok(x), Ok(y)) = (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
            return x.cmp(&y);
        }
    }
    canonical(a).cmp(&canonical(b))
}

/// Nulls sort last in either direction
fn compare_fields(a: Option<&Value>, b: Option<&Value>, ascending: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = compare_values(a, b);
            if ascending { ord } else { ord.reverse() }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(column, value) => row.get(column).is_some_and(|v| values_equal(v, value)),
        Filter::Gt(column, value) => row
            .get(column)
            .filter(|v| !v.is_null())
            .is_some_and(|v| compare_values(v, value) == Ordering::Greater),
    }
}
