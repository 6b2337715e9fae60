//! Result access API
//!
//! The command/query surface consumed by result-recording and
//! result-reporting clients. Each operation translates into one or more
//! storage-layer statements, applies the value codec and shapes rows
//! into decoded records keyed by their surrogate id.
//!
//! The store handle is injected at construction; nothing here resolves
//! connections by name.

use crate::storage::{
    NewVariableRow, OrderDir, OrderField, ResultField, ResultRow, SqliteStore, StoreStats,
    VariableRow, VariableScope,
};
use crate::variable::Variable;
use crate::{Error, Result, codec};
use std::collections::BTreeMap;

/// Access API over an injected SQLite store
pub struct ResultStorage {
    store: SqliteStore,
}

/// Options for result listings: whitelisted ordering plus pagination
#[derive(Debug, Clone, Copy)]
pub struct ResultQuery {
    pub order: Option<OrderField>,
    pub order_dir: OrderDir,
    pub offset: u64,
    pub limit: u64,
}

impl Default for ResultQuery {
    fn default() -> Self {
        Self {
            order: None,
            order_dir: OrderDir::Asc,
            offset: 0,
            limit: 1000,
        }
    }
}

/// A decoded variable row as returned by the read operations
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VariableRecord {
    pub variable_id: i64,
    /// Concrete kind of the deserialized value ("response", "outcome", ...)
    pub type_tag: &'static str,
    pub result_id: String,
    pub call_id_item: Option<String>,
    pub call_id_test: Option<String>,
    pub test: String,
    pub item: Option<String>,
    pub variable: Variable,
}

impl ResultStorage {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    // ========== Write Operations ==========

    /// Store a single test-scoped variable
    pub fn store_test_variable(
        &self,
        result_id: &str,
        test: &str,
        variable: Variable,
        call_id_test: &str,
    ) -> Result<()> {
        self.store_test_variables(result_id, test, vec![variable], call_id_test)
    }

    /// Store a batch of test-scoped variables for one call id.
    ///
    /// Variables without an epoch are stamped with the current time
    /// before serialization; all rows go in as one batch insert.
    pub fn store_test_variables(
        &self,
        result_id: &str,
        test: &str,
        variables: Vec<Variable>,
        call_id_test: &str,
    ) -> Result<()> {
        let rows = self.prepare_rows(result_id, test, None, variables, call_id_test)?;
        self.store.insert_variables(&rows)
    }

    /// Store a single item-scoped variable
    pub fn store_item_variable(
        &self,
        result_id: &str,
        test: &str,
        item: &str,
        variable: Variable,
        call_id_item: &str,
    ) -> Result<()> {
        self.store_item_variables(result_id, test, item, vec![variable], call_id_item)
    }

    /// Store a batch of item-scoped variables for one call id
    pub fn store_item_variables(
        &self,
        result_id: &str,
        test: &str,
        item: &str,
        variables: Vec<Variable>,
        call_id_item: &str,
    ) -> Result<()> {
        let rows = self.prepare_rows(result_id, test, Some(item), variables, call_id_item)?;
        self.store.insert_variables(&rows)
    }

    /// Associate a test taker with a result, creating the result row on
    /// first touch
    pub fn store_related_test_taker(&self, result_id: &str, test_taker_id: &str) -> Result<()> {
        self.store_related_data(result_id, ResultField::TestTaker, test_taker_id)
    }

    /// Associate a delivery with a result, creating the result row on
    /// first touch
    pub fn store_related_delivery(&self, result_id: &str, delivery_id: &str) -> Result<()> {
        self.store_related_data(result_id, ResultField::Delivery, delivery_id)
    }

    fn store_related_data(&self, result_id: &str, field: ResultField, value: &str) -> Result<()> {
        self.store.upsert_result_field(result_id, field, value)
    }

    // ========== Read Operations ==========

    /// All variables sharing any of the given call ids, decoded and
    /// grouped by surrogate id in ascending order
    pub fn get_variables(&self, call_ids: &[&str]) -> Result<BTreeMap<i64, Vec<VariableRecord>>> {
        let rows = self.store.variables_by_call_ids(call_ids)?;
        group_records(rows)
    }

    /// All variables belonging to the given results, decoded and grouped
    /// by surrogate id
    pub fn get_delivery_variables(
        &self,
        result_ids: &[&str],
    ) -> Result<BTreeMap<i64, Vec<VariableRecord>>> {
        let rows = self.store.variables_by_result_ids(result_ids)?;
        group_records(rows)
    }

    /// Variables for one call id (either scope) with the given
    /// identifier, keyed by surrogate id. The schema does not force
    /// uniqueness, so duplicates all come back.
    pub fn get_variable(
        &self,
        call_id: &str,
        identifier: &str,
    ) -> Result<BTreeMap<i64, VariableRecord>> {
        let rows = self
            .store
            .variables_by_call_id_and_identifier(call_id, identifier)?;
        let mut records = BTreeMap::new();
        for row in rows {
            let record = decode_row(row)?;
            records.insert(record.variable_id, record);
        }
        Ok(records)
    }

    /// Read one named property off a specific variable's deserialized
    /// value. Absent rows and property names the concrete value kind
    /// does not expose both yield `None`.
    pub fn get_variable_property(
        &self,
        variable_id: i64,
        property: &str,
    ) -> Result<Option<serde_json::Value>> {
        match self.store.variable_value(variable_id)? {
            Some(raw) => Ok(codec::decode(&raw)?.property(property)),
            None => Ok(None),
        }
    }

    /// Test taker associated with a result, if any
    pub fn get_test_taker(&self, result_id: &str) -> Result<Option<String>> {
        self.store.result_field(result_id, ResultField::TestTaker)
    }

    /// Delivery associated with a result, if any
    pub fn get_delivery(&self, result_id: &str) -> Result<Option<String>> {
        self.store.result_field(result_id, ResultField::Delivery)
    }

    /// Every call id known to the variables table, item-scoped ids taking
    /// precedence per row. Full scan; maintenance/reporting use only.
    pub fn get_all_call_ids(&self) -> Result<Vec<String>> {
        let tuples = self.store.distinct_call_id_tuples()?;
        Ok(tuples
            .into_iter()
            .filter_map(|(call_id_item, call_id_test, _result_id)| {
                call_id_item.filter(|id| !id.is_empty()).or(call_id_test)
            })
            .collect())
    }

    /// Distinct item call ids recorded for a result
    pub fn get_related_item_call_ids(&self, result_id: &str) -> Result<Vec<String>> {
        self.store.distinct_call_ids(result_id, VariableScope::Item)
    }

    /// Distinct test call ids recorded for a result
    pub fn get_related_test_call_ids(&self, result_id: &str) -> Result<Vec<String>> {
        self.store.distinct_call_ids(result_id, VariableScope::Test)
    }

    /// (result id, test taker) over all result rows. Full scan.
    pub fn get_all_test_taker_ids(&self) -> Result<Vec<(String, Option<String>)>> {
        self.store.result_ids_with(ResultField::TestTaker)
    }

    /// (result id, delivery) over all result rows. Full scan.
    pub fn get_all_delivery_ids(&self) -> Result<Vec<(String, Option<String>)>> {
        self.store.result_ids_with(ResultField::Delivery)
    }

    /// Result rows filtered by delivery, ordered and paginated per the
    /// query options. An empty filter selects all rows.
    pub fn get_result_by_delivery(
        &self,
        deliveries: &[&str],
        query: &ResultQuery,
    ) -> Result<Vec<ResultRow>> {
        let order = query.order.map(|field| (field, query.order_dir));
        self.store
            .results_by_delivery(deliveries, order, query.offset, query.limit)
    }

    /// Count of result rows matching the delivery filter
    pub fn count_result_by_delivery(&self, deliveries: &[&str]) -> Result<u64> {
        self.store.count_results_by_delivery(deliveries)
    }

    // ========== Lifecycle ==========

    /// Delete a result and all variables referencing it, as one unit
    pub fn delete_result(&mut self, result_id: &str) -> Result<()> {
        self.store.delete_result(result_id)
    }

    /// Result ids are caller-supplied; this backend cannot mint them.
    pub fn spawn_result(&self) -> Result<String> {
        tracing::warn!("spawn_result is not supported by the relational backend");
        Err(Error::Unsupported("spawn_result"))
    }

    /// Row counts for reporting
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    // ========== Internals ==========

    fn prepare_rows(
        &self,
        result_id: &str,
        test: &str,
        item: Option<&str>,
        variables: Vec<Variable>,
        call_id: &str,
    ) -> Result<Vec<NewVariableRow>> {
        let mut rows = Vec::with_capacity(variables.len());
        for mut variable in variables {
            variable.ensure_epoch();
            let (call_id_item, call_id_test) = match item {
                Some(_) => (Some(call_id.to_string()), None),
                None => (None, Some(call_id.to_string())),
            };
            rows.push(NewVariableRow {
                result_id: result_id.to_string(),
                test: test.to_string(),
                item: item.map(str::to_string),
                call_id_item,
                call_id_test,
                identifier: variable.identifier.clone(),
                value: codec::encode(&variable)?,
            });
        }
        Ok(rows)
    }
}

/// Decode a raw row into the shaped record handed to callers
fn decode_row(row: VariableRow) -> Result<VariableRecord> {
    let variable = codec::decode(&row.value)?;
    Ok(VariableRecord {
        variable_id: row.variable_id,
        type_tag: variable.value.type_tag(),
        result_id: row.result_id,
        call_id_item: row.call_id_item,
        call_id_test: row.call_id_test,
        test: row.test,
        item: row.item,
        variable,
    })
}

fn group_records(rows: Vec<VariableRow>) -> Result<BTreeMap<i64, Vec<VariableRecord>>> {
    let mut grouped: BTreeMap<i64, Vec<VariableRecord>> = BTreeMap::new();
    for row in rows {
        let record = decode_row(row)?;
        grouped.entry(record.variable_id).or_default().push(record);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{VariableValue, now_epoch};

    fn storage() -> ResultStorage {
        ResultStorage::new(SqliteStore::open_in_memory().unwrap())
    }

    fn outcome(identifier: &str, value: &str) -> Variable {
        Variable::new(
            identifier,
            VariableValue::Outcome {
                value: Some(value.to_string()),
                normal_minimum: None,
                normal_maximum: None,
            },
        )
    }

    fn response(identifier: &str, candidate: &str) -> Variable {
        Variable::new(
            identifier,
            VariableValue::Response {
                candidate_response: Some(candidate.to_string()),
                correct_response: None,
            },
        )
    }

    #[test]
    fn test_batch_store_round_trips_by_call_id() {
        let storage = storage();
        let variables = vec![
            outcome("SCORE", "0.5"),
            outcome("MAXSCORE", "1.0"),
            outcome("PASS", "true"),
        ];
        storage
            .store_test_variables("res-1", "test-1", variables.clone(), "call-1")
            .unwrap();

        let grouped = storage.get_variables(&["call-1"]).unwrap();
        assert_eq!(grouped.len(), 3);

        let records: Vec<&VariableRecord> =
            grouped.values().map(|group| &group[0]).collect();
        for (record, stored) in records.iter().zip(&variables) {
            assert_eq!(record.variable.identifier, stored.identifier);
            assert_eq!(record.variable.value, stored.value);
            assert_eq!(record.test, "test-1");
            assert_eq!(record.item, None);
            assert_eq!(record.call_id_test.as_deref(), Some("call-1"));
            assert_eq!(record.type_tag, "outcome");
        }
    }

    #[test]
    fn test_missing_epoch_is_stamped_at_write() {
        let storage = storage();
        storage
            .store_test_variable("res-1", "test-1", outcome("SCORE", "1.0"), "call-1")
            .unwrap();

        let grouped = storage.get_variables(&["call-1"]).unwrap();
        let record = &grouped.values().next().unwrap()[0];
        let epoch = record.variable.epoch.expect("epoch stamped at write");
        assert!(epoch > 0.0);
        assert!(epoch <= now_epoch());
    }

    #[test]
    fn test_explicit_epoch_is_preserved() {
        let storage = storage();
        let variable = outcome("SCORE", "1.0").with_epoch(1700000000.5);
        storage
            .store_test_variable("res-1", "test-1", variable, "call-1")
            .unwrap();

        let grouped = storage.get_variables(&["call-1"]).unwrap();
        let record = &grouped.values().next().unwrap()[0];
        assert_eq!(record.variable.epoch, Some(1700000000.5));
    }

    #[test]
    fn test_item_variables_carry_item_scope() {
        let storage = storage();
        storage
            .store_item_variable("res-1", "test-1", "item-3", response("RESPONSE", "b"), "call-i3")
            .unwrap();

        let grouped = storage.get_variables(&["call-i3"]).unwrap();
        let record = &grouped.values().next().unwrap()[0];
        assert_eq!(record.item.as_deref(), Some("item-3"));
        assert_eq!(record.call_id_item.as_deref(), Some("call-i3"));
        assert_eq!(record.call_id_test, None);
        assert_eq!(record.type_tag, "response");
    }

    #[test]
    fn test_related_data_upserts_into_one_row() {
        let storage = storage();
        storage.store_related_test_taker("res-1", "taker-1").unwrap();
        storage.store_related_delivery("res-1", "delivery-1").unwrap();

        assert_eq!(storage.get_test_taker("res-1").unwrap().as_deref(), Some("taker-1"));
        assert_eq!(storage.get_delivery("res-1").unwrap().as_deref(), Some("delivery-1"));
        assert_eq!(storage.count_result_by_delivery(&[]).unwrap(), 1);
    }

    #[test]
    fn test_lookup_of_unknown_result_is_absent_not_error() {
        let storage = storage();
        assert_eq!(storage.get_test_taker("nope").unwrap(), None);
        assert_eq!(storage.get_delivery("nope").unwrap(), None);
        assert!(storage.get_delivery_variables(&["nope"]).unwrap().is_empty());
    }

    #[test]
    fn test_get_variable_by_identifier() {
        let storage = storage();
        storage
            .store_test_variables(
                "res-1",
                "test-1",
                vec![outcome("SCORE", "0.75"), outcome("MAXSCORE", "1.0")],
                "call-1",
            )
            .unwrap();

        let records = storage.get_variable("call-1", "SCORE").unwrap();
        assert_eq!(records.len(), 1);
        let record = records.values().next().unwrap();
        assert_eq!(record.variable.property("value"), Some(serde_json::json!("0.75")));

        // same row is reachable through the delivery listing, keyed by
        // the same surrogate id
        let by_delivery = storage.get_delivery_variables(&["res-1"]).unwrap();
        assert!(by_delivery.contains_key(&record.variable_id));

        assert!(storage.get_variable("call-1", "UNKNOWN").unwrap().is_empty());
    }

    #[test]
    fn test_variable_property_absent_cases() {
        let storage = storage();
        storage
            .store_test_variable("res-1", "test-1", outcome("SCORE", "0.75"), "call-1")
            .unwrap();
        let records = storage.get_variable("call-1", "SCORE").unwrap();
        let id = *records.keys().next().unwrap();

        assert_eq!(
            storage.get_variable_property(id, "value").unwrap(),
            Some(serde_json::json!("0.75"))
        );
        // property the stored kind does not expose
        assert_eq!(storage.get_variable_property(id, "candidate_response").unwrap(), None);
        // missing row
        assert_eq!(storage.get_variable_property(id + 999, "value").unwrap(), None);
    }

    #[test]
    fn test_call_id_enumeration() {
        let storage = storage();
        storage
            .store_test_variable("res-1", "test-1", outcome("SCORE", "1"), "call-t1")
            .unwrap();
        storage
            .store_item_variable("res-1", "test-1", "item-1", response("RESPONSE", "a"), "call-i1")
            .unwrap();
        storage
            .store_item_variable("res-2", "test-1", "item-1", response("RESPONSE", "b"), "call-i2")
            .unwrap();

        let mut all = storage.get_all_call_ids().unwrap();
        all.sort();
        assert_eq!(all, vec!["call-i1", "call-i2", "call-t1"]);

        assert_eq!(storage.get_related_item_call_ids("res-1").unwrap(), vec!["call-i1"]);
        assert_eq!(storage.get_related_test_call_ids("res-1").unwrap(), vec!["call-t1"]);
        assert!(storage.get_related_item_call_ids("res-9").unwrap().is_empty());
    }

    #[test]
    fn test_id_listings_pair_result_with_field() {
        let storage = storage();
        storage.store_related_test_taker("res-1", "taker-1").unwrap();
        storage.store_related_delivery("res-2", "delivery-2").unwrap();

        let mut takers = storage.get_all_test_taker_ids().unwrap();
        takers.sort();
        assert_eq!(
            takers,
            vec![
                ("res-1".to_string(), Some("taker-1".to_string())),
                ("res-2".to_string(), None),
            ]
        );

        let mut deliveries = storage.get_all_delivery_ids().unwrap();
        deliveries.sort();
        assert_eq!(deliveries[0], ("res-1".to_string(), None));
        assert_eq!(deliveries[1], ("res-2".to_string(), Some("delivery-2".to_string())));
    }

    #[test]
    fn test_result_listing_pagination() {
        let storage = storage();
        for i in 0..5 {
            storage
                .store_related_delivery(&format!("res-{i}"), "delivery-1")
                .unwrap();
        }

        let query = ResultQuery {
            order: Some(OrderField::ResultId),
            order_dir: OrderDir::Asc,
            offset: 0,
            limit: 2,
        };
        let page = storage.get_result_by_delivery(&["delivery-1"], &query).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].result_id, "res-0");
        assert_eq!(page[1].result_id, "res-1");

        assert_eq!(storage.count_result_by_delivery(&["delivery-1"]).unwrap(), 5);

        // defaults: offset 0, limit 1000, unordered
        let all = storage
            .get_result_by_delivery(&["delivery-1"], &ResultQuery::default())
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_delete_result_removes_variables_and_row() {
        let mut storage = storage();
        storage.store_related_delivery("res-1", "delivery-1").unwrap();
        storage
            .store_test_variables(
                "res-1",
                "test-1",
                vec![outcome("SCORE", "1"), outcome("PASS", "true")],
                "call-1",
            )
            .unwrap();

        storage.delete_result("res-1").unwrap();

        assert!(storage.get_delivery_variables(&["res-1"]).unwrap().is_empty());
        assert_eq!(storage.get_test_taker("res-1").unwrap(), None);
        assert_eq!(storage.get_delivery("res-1").unwrap(), None);
    }

    #[test]
    fn test_orphaned_variables_are_readable() {
        // variables stored without any related-data call have no result
        // row; the read side still serves them
        let storage = storage();
        storage
            .store_test_variable("res-orphan", "test-1", outcome("SCORE", "1"), "call-1")
            .unwrap();

        assert_eq!(storage.get_delivery_variables(&["res-orphan"]).unwrap().len(), 1);
        assert_eq!(storage.get_test_taker("res-orphan").unwrap(), None);
    }

    #[test]
    fn test_spawn_result_reports_unsupported() {
        let storage = storage();
        assert!(matches!(storage.spawn_result(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_score_example_end_to_end() {
        let storage = storage();
        let score = Variable::new(
            "SCORE",
            VariableValue::Outcome {
                value: Some("0.75".to_string()),
                normal_minimum: Some(0.0),
                normal_maximum: Some(1.0),
            },
        );
        storage
            .store_test_variable("res-1", "test-1", score, "call-1")
            .unwrap();

        let records = storage.get_variable("call-1", "SCORE").unwrap();
        assert_eq!(records.len(), 1);
        let (id, record) = records.iter().next().unwrap();
        match &record.variable.value {
            VariableValue::Outcome { value, .. } => {
                assert_eq!(value.as_deref(), Some("0.75"));
            }
            other => panic!("unexpected value kind: {other:?}"),
        }

        let by_delivery = storage.get_delivery_variables(&["res-1"]).unwrap();
        assert_eq!(by_delivery.len(), 1);
        assert_eq!(by_delivery[id][0].variable, record.variable);
    }
}
