use std::collections::HashMap;

use assetlink_wire::WireBuffer;
use serde_json::{Map, Value};

use crate::error::{Result, TelemetryError};
use crate::metrics::{MetricId, MetricRecord};

/// One type byte plus a u32 size word.
pub const TABLE_HEADER_SIZE: usize = 1 + 4;

/// An insertion-ordered name to record map with precomputed wire size.
///
/// The size accumulator grows on every insertion (key prefix + key bytes +
/// fixed record size), so `write` never needs a measuring pass. Multiple
/// tables of different record types share one payload back-to-back; the
/// type byte at the head of each lets `read` dispatch without outer
/// framing.
pub struct MetricTable<R> {
    entries: Vec<(String, R)>,
    index: HashMap<String, usize>,
    sequence: MetricId,
    size: usize,
}

impl<R: MetricRecord> MetricTable<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            sequence: 0,
            size: TABLE_HEADER_SIZE,
        }
    }

    /// Drop all entries and restart the sequence counter for a new tick.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.sequence = 0;
        self.size = TABLE_HEADER_SIZE;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total serialized size in bytes, header included.
    pub fn wire_size(&self) -> usize {
        self.size
    }

    pub fn get(&self, name: &str) -> Option<&R> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut R> {
        let i = *self.index.get(name)?;
        Some(&mut self.entries[i].1)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &R)> {
        self.entries.iter().map(|(name, rec)| (name.as_str(), rec))
    }

    /// Insert a record under a key not present yet, assigning the next
    /// sequence id and growing the size accumulator.
    ///
    /// Re-inserting an existing key replaces the record but keeps the
    /// original id and does not grow the accumulator.
    pub fn insert(&mut self, name: &str, mut record: R) -> &mut R {
        if let Some(&i) = self.index.get(name) {
            let id = self.entries[i].1.id();
            record.assign_id(id);
            self.entries[i].1 = record;
            return &mut self.entries[i].1;
        }

        record.assign_id(self.sequence);
        self.sequence += 1;
        self.size += 2 + name.len() + R::PACKED_SIZE;
        self.entries.push((name.to_string(), record));
        self.index.insert(name.to_string(), self.entries.len() - 1);
        let last = self.entries.len() - 1;
        &mut self.entries[last].1
    }

    /// Serialize the table: type byte, total size, then each entry as a
    /// u16-prefixed key followed by the record's fixed fields.
    pub fn write(&self, buf: &mut WireBuffer<'_>) -> Result<()> {
        buf.write_u8(R::TABLE_TYPE)?;
        buf.write_u32(self.size as u32)?;
        let start = buf.position() - TABLE_HEADER_SIZE;

        for (name, record) in &self.entries {
            buf.write_utf(name)?;
            record.write(buf)?;
        }

        let written = buf.position() - start;
        if written != self.size {
            return Err(TelemetryError::SizeMismatch {
                tracked: self.size,
                written,
            });
        }
        Ok(())
    }

    /// Try to read one table of this record type at the cursor.
    ///
    /// A different type byte rewinds the peek and returns `Ok(false)` so
    /// the caller can try another table type at the same position.
    pub fn read(&mut self, buf: &mut WireBuffer<'_>) -> Result<bool> {
        let ty = buf.read_u8()?;
        if ty != R::TABLE_TYPE {
            buf.rewind(1)?;
            return Ok(false);
        }

        let size = buf.read_u32()? as usize;
        let start = buf.position() - TABLE_HEADER_SIZE;
        while buf.position() - start < size {
            let name = buf.read_utf()?;
            let mut record = R::default();
            record.read(buf)?;
            self.insert_decoded(name, record);
        }

        let consumed = buf.position() - start;
        if consumed != size {
            return Err(TelemetryError::SizeMismatch {
                tracked: size,
                written: consumed,
            });
        }
        self.size = size;
        Ok(true)
    }

    // Decoded records keep their wire ids instead of taking fresh ones.
    fn insert_decoded(&mut self, name: String, record: R) {
        if let Some(&i) = self.index.get(&name) {
            self.entries[i].1 = record;
            return;
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, record));
    }

    /// Records as a JSON array ordered by id, each with its `name` merged
    /// into the record object.
    pub fn to_json_array(&self) -> Value {
        let mut items: Vec<(MetricId, Value)> = self
            .entries
            .iter()
            .map(|(name, record)| {
                let mut obj = match record.to_json() {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert("value".to_string(), other);
                        map
                    }
                };
                obj.insert("name".to_string(), Value::String(name.clone()));
                (record.id(), Value::Object(obj))
            })
            .collect();
        items.sort_by_key(|(id, _)| *id);
        Value::Array(items.into_iter().map(|(_, v)| v).collect())
    }

    /// Records as a name-keyed JSON object using the compact per-record
    /// form.
    pub fn to_json_object(&self) -> Value {
        let mut map = Map::new();
        for (name, record) in &self.entries {
            map.insert(name.clone(), record.json_property());
        }
        Value::Object(map)
    }
}

impl<R: MetricRecord> Default for MetricTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::metrics::{TickMetricRange, TickMetricValue};

    #[test]
    fn insert_assigns_sequential_ids_and_tracks_size() {
        let mut table = MetricTable::<TickMetricValue>::new();
        assert_eq!(table.wire_size(), TABLE_HEADER_SIZE);

        table.insert("fps", TickMetricValue { id: 0, value: 60.0 });
        table.insert("gc.ms", TickMetricValue { id: 0, value: 1.5 });

        assert_eq!(table.get("fps").map(|m| m.id), Some(0));
        assert_eq!(table.get("gc.ms").map(|m| m.id), Some(1));
        assert_eq!(
            table.wire_size(),
            TABLE_HEADER_SIZE
                + (2 + 3 + TickMetricValue::PACKED_SIZE)
                + (2 + 5 + TickMetricValue::PACKED_SIZE)
        );
    }

    #[test]
    fn reinsert_keeps_id_and_size() {
        let mut table = MetricTable::<TickMetricValue>::new();
        table.insert("fps", TickMetricValue { id: 0, value: 60.0 });
        let size = table.wire_size();

        let updated = table.insert("fps", TickMetricValue { id: 0, value: 30.0 });
        assert_eq!(updated.id, 0);
        assert_eq!(updated.value, 30.0);
        assert_eq!(table.wire_size(), size);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut table = MetricTable::<TickMetricValue>::new();
        table.insert("a", TickMetricValue::default());
        table.insert("b", TickMetricValue::default());
        table.reset();
        let fresh = table.insert("c", TickMetricValue::default());
        assert_eq!(fresh.id, 0);
        assert_eq!(
            table.wire_size(),
            TABLE_HEADER_SIZE + 2 + 1 + TickMetricValue::PACKED_SIZE
        );
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut table = MetricTable::<TickMetricValue>::new();
        table.insert("fps", TickMetricValue { id: 0, value: 60.0 });
        table.insert("mem.mb", TickMetricValue { id: 0, value: 128.25 });

        let mut buf = WireBuffer::new();
        table.write(&mut buf).unwrap();
        assert_eq!(buf.len(), table.wire_size());

        buf.set_position(0);
        let mut back = MetricTable::<TickMetricValue>::new();
        assert!(back.read(&mut buf).unwrap());
        assert!(buf.is_exhausted());
        assert_eq!(back.get("fps"), Some(&TickMetricValue { id: 0, value: 60.0 }));
        assert_eq!(
            back.get("mem.mb"),
            Some(&TickMetricValue { id: 1, value: 128.25 })
        );
    }

    #[test]
    fn read_rejects_other_table_types_without_consuming() {
        let mut ranges = MetricTable::<TickMetricRange>::new();
        ranges.insert("frame", TickMetricRange::default());
        let mut buf = WireBuffer::new();
        ranges.write(&mut buf).unwrap();

        buf.set_position(0);
        let mut values = MetricTable::<TickMetricValue>::new();
        assert!(!values.read(&mut buf).unwrap());
        assert_eq!(buf.position(), 0);

        let mut back = MetricTable::<TickMetricRange>::new();
        assert!(back.read(&mut buf).unwrap());
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn heterogeneous_tables_decode_back_to_back() {
        let mut values = MetricTable::<TickMetricValue>::new();
        values.insert("tickId", TickMetricValue { id: 0, value: 42.0 });
        let mut ranges = MetricTable::<TickMetricRange>::new();
        ranges.insert("frame", TickMetricRange::default());

        let mut buf = WireBuffer::new();
        values.write(&mut buf).unwrap();
        ranges.write(&mut buf).unwrap();

        buf.set_position(0);
        let mut dec_values = MetricTable::<TickMetricValue>::new();
        let mut dec_ranges = MetricTable::<TickMetricRange>::new();
        while !buf.is_exhausted() {
            if dec_values.read(&mut buf).unwrap() {
                continue;
            }
            assert!(dec_ranges.read(&mut buf).unwrap());
        }
        assert_eq!(dec_values.len(), 1);
        assert_eq!(dec_ranges.len(), 1);
    }

    #[test]
    fn json_array_is_ordered_by_id() {
        let mut table = MetricTable::<TickMetricValue>::new();
        table.insert("first", TickMetricValue { id: 0, value: 1.0 });
        table.insert("second", TickMetricValue { id: 0, value: 2.0 });

        let array = table.to_json_array();
        assert_eq!(
            array,
            json!([
                { "id": 0, "name": "first", "value": 1.0 },
                { "id": 1, "name": "second", "value": 2.0 },
            ])
        );
    }

    #[test]
    fn json_object_uses_compact_values() {
        let mut table = MetricTable::<TickMetricValue>::new();
        table.insert("fps", TickMetricValue { id: 0, value: 60.0 });
        assert_eq!(table.to_json_object(), json!({ "fps": 60.0 }));
    }
}
