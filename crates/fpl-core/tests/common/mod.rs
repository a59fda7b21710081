#![allow(dead_code)]

use bytes::Bytes;
use fpl_bucket::{BucketStore, MemoryBucketStore};
use fpl_core::schema::TableSchema;
use fpl_core::warehouse::Value;

pub const GAMEWEEK_HEADER: &str = "name,position,team,element,fixture,kickoff_time,GW,opponent_team,was_home,clean_sheets,starts,minutes,total_points,value,xP,team_h_score,team_a_score";

pub async fn store_with(bucket: &str, objects: &[(&str, String)]) -> MemoryBucketStore {
    let store = MemoryBucketStore::new();
    store.create_bucket(bucket);
    for (key, body) in objects {
        store
            .put_object(bucket, key, Bytes::from(body.clone()))
            .await
            .expect("seed object");
    }
    store
}

pub fn csv(header: &str, rows: &[&str]) -> String {
    let mut body = String::from(header);
    body.push('\n');
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    body
}

pub fn column_index(table: &TableSchema, name: &str) -> usize {
    table
        .columns
        .iter()
        .position(|spec| spec.name == name)
        .unwrap_or_else(|| panic!("{} has no column {name}", table.name))
}

/// Finds the stored row whose text column `key_column` equals `key`.
pub fn row_for<'a>(
    rows: &'a [Vec<Value>],
    table: &TableSchema,
    key_column: &str,
    key: &str,
) -> &'a [Value] {
    let idx = column_index(table, key_column);
    rows.iter()
        .find(|row| row[idx] == Value::Text(Some(key.to_string())))
        .unwrap_or_else(|| panic!("no row with {key_column} = {key}"))
}
