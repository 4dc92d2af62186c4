use assetlink_wire::WireBuffer;
use serde_json::{json, Value};

use crate::error::Result;

/// Table-unique metric id, assigned from a per-tick sequence counter.
pub type MetricId = i32;

/// A fixed-size record stored in a [`MetricTable`](crate::table::MetricTable).
///
/// `PACKED_SIZE` is the exact serialized byte count of one record, which
/// lets the table precompute its total wire size at insertion time instead
/// of taking a second measuring pass at send time.
pub trait MetricRecord: Clone + Default {
    /// Wire discriminant distinguishing table kinds in a shared payload.
    const TABLE_TYPE: u8;
    /// Serialized size of one record in bytes.
    const PACKED_SIZE: usize;

    fn id(&self) -> MetricId;
    fn assign_id(&mut self, id: MetricId);

    fn write(&self, buf: &mut WireBuffer<'_>) -> Result<()>;
    fn read(&mut self, buf: &mut WireBuffer<'_>) -> Result<()>;

    /// Full record as a JSON object (without the key name).
    fn to_json(&self) -> Value;

    /// Compact form used in the name-keyed object projection.
    fn json_property(&self) -> Value {
        self.to_json()
    }
}

/// One named floating point sample for the current tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickMetricValue {
    pub id: MetricId,
    pub value: f64,
}

impl MetricRecord for TickMetricValue {
    const TABLE_TYPE: u8 = 1;
    const PACKED_SIZE: usize = 4 + 8;

    fn id(&self) -> MetricId {
        self.id
    }

    fn assign_id(&mut self, id: MetricId) {
        self.id = id;
    }

    fn write(&self, buf: &mut WireBuffer<'_>) -> Result<()> {
        buf.write_i32(self.id)?;
        buf.write_f64(self.value)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut WireBuffer<'_>) -> Result<()> {
        self.id = buf.read_i32()?;
        self.value = buf.read_f64()?;
        Ok(())
    }

    fn to_json(&self) -> Value {
        json!({ "id": self.id, "value": self.value })
    }

    fn json_property(&self) -> Value {
        json!(self.value)
    }
}

/// One timed span in the tick's call tree.
///
/// `parent`, `level`, `children` and `sibling` encode the tree shape so a
/// viewer can rebuild the flame graph without replaying the event stream.
/// The duplicate counters only exist on the recording side to disambiguate
/// same-named spans; they are not serialized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickMetricRange {
    pub id: MetricId,
    /// Id of the enclosing span, -1 for a root.
    pub parent: MetricId,
    /// Nesting depth, 0 for a root.
    pub level: i32,
    /// Number of direct child spans opened under this one.
    pub children: i32,
    /// Index among the parent's children at open time.
    pub sibling: i32,
    /// Same-named spans seen so far this tick.
    pub duplicates: i32,
    /// Same-named spans currently open.
    pub duplicates_on_stack: i32,
    /// Span start, nanoseconds since tick begin.
    pub begin_ns: f64,
    /// Span end, nanoseconds since tick begin.
    pub end_ns: f64,
}

impl Default for TickMetricRange {
    fn default() -> Self {
        Self {
            id: 0,
            parent: -1,
            level: 0,
            children: 0,
            sibling: 0,
            duplicates: 0,
            duplicates_on_stack: 0,
            begin_ns: 0.0,
            end_ns: 0.0,
        }
    }
}

impl MetricRecord for TickMetricRange {
    const TABLE_TYPE: u8 = 2;
    const PACKED_SIZE: usize = 4 + 4 * 4 + 2 * 8;

    fn id(&self) -> MetricId {
        self.id
    }

    fn assign_id(&mut self, id: MetricId) {
        self.id = id;
    }

    fn write(&self, buf: &mut WireBuffer<'_>) -> Result<()> {
        buf.write_i32(self.id)?;
        buf.write_i32(self.parent)?;
        buf.write_i32(self.level)?;
        buf.write_i32(self.children)?;
        buf.write_i32(self.sibling)?;
        buf.write_f64(self.begin_ns)?;
        buf.write_f64(self.end_ns)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut WireBuffer<'_>) -> Result<()> {
        self.id = buf.read_i32()?;
        self.parent = buf.read_i32()?;
        self.level = buf.read_i32()?;
        self.children = buf.read_i32()?;
        self.sibling = buf.read_i32()?;
        self.begin_ns = buf.read_f64()?;
        self.end_ns = buf.read_f64()?;
        Ok(())
    }

    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "parent": self.parent,
            "level": self.level,
            "children": self.children,
            "sibling": self.sibling,
            "a": self.begin_ns,
            "b": self.end_ns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_record_round_trips_at_packed_size() {
        let metric = TickMetricValue {
            id: 7,
            value: 16.125,
        };
        let mut buf = WireBuffer::new();
        metric.write(&mut buf).unwrap();
        assert_eq!(buf.len(), TickMetricValue::PACKED_SIZE);

        buf.set_position(0);
        let mut back = TickMetricValue::default();
        back.read(&mut buf).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn range_record_round_trips_without_duplicate_counters() {
        let metric = TickMetricRange {
            id: 3,
            parent: 1,
            level: 2,
            children: 4,
            sibling: 0,
            duplicates: 9,
            duplicates_on_stack: 9,
            begin_ns: 1000.0,
            end_ns: 2500.5,
        };
        let mut buf = WireBuffer::new();
        metric.write(&mut buf).unwrap();
        assert_eq!(buf.len(), TickMetricRange::PACKED_SIZE);

        buf.set_position(0);
        let mut back = TickMetricRange::default();
        back.read(&mut buf).unwrap();
        assert_eq!(back.id, 3);
        assert_eq!(back.parent, 1);
        assert_eq!(back.begin_ns, 1000.0);
        assert_eq!(back.end_ns, 2500.5);
        // Recording-side counters never travel.
        assert_eq!(back.duplicates, 0);
        assert_eq!(back.duplicates_on_stack, 0);
    }

    #[test]
    fn value_json_property_is_the_bare_number() {
        let metric = TickMetricValue { id: 0, value: 60.0 };
        assert_eq!(metric.json_property(), json!(60.0));
        assert_eq!(metric.to_json(), json!({ "id": 0, "value": 60.0 }));
    }
}
