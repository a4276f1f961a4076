//! Modbus unit (slave) model
//!
//! A unit owns a set of data points with non-overlapping address spans per
//! area and serves the resolved read/write operations. The unit is the
//! mutation-lock granularity: one resolved operation (including feedback
//! propagation) runs under one lock acquisition, so protocol writers, the
//! simulation engine and readers never observe a half-applied
//! multi-register value.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use rand::Rng;

use super::codec::{self, CodecError, Endianness};
use super::point::DataPoint;
use super::value::{AccessMode, DataArea, DataType, DataValue};
use crate::protocol::frame::ExceptionCode;

/// Immutable per-area index entry, usable without taking the value lock
#[derive(Debug, Clone)]
struct IndexEntry {
    id: String,
    address: u16,
    span: u16,
    access: AccessMode,
    data_type: DataType,
    length: Option<u16>,
}

/// One point of a resolved `(area, address, count)` range
#[derive(Debug, Clone)]
pub struct ResolvedPoint {
    pub id: String,
    pub address: u16,
    pub span: u16,
}

/// A Modbus slave unit addressed by unit id
#[derive(Debug)]
pub struct ModbusUnit {
    unit_id: u8,
    /// start address -> entry, per declared area; fixed after construction
    index: HashMap<DataArea, BTreeMap<u16, IndexEntry>>,
    /// live point values, guarded by the unit mutation lock
    points: RwLock<BTreeMap<String, DataPoint>>,
}

impl ModbusUnit {
    /// Build a unit from validated points, checking the cross-point
    /// invariants: unique ids, non-overlapping spans per area, and sound
    /// feedback references. All violations are collected.
    pub fn new(unit_id: u8, points: Vec<DataPoint>) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let mut by_id: BTreeMap<String, DataPoint> = BTreeMap::new();

        for point in points {
            if by_id.contains_key(&point.id) {
                errors.push(format!(
                    "unit {unit_id}: duplicate point id '{}'",
                    point.id
                ));
                continue;
            }
            by_id.insert(point.id.clone(), point);
        }

        let mut index: HashMap<DataArea, BTreeMap<u16, IndexEntry>> = HashMap::new();
        for point in by_id.values() {
            for area in &point.areas {
                let span = if area.is_bit() { 1 } else { point.span() };
                index.entry(*area).or_default().insert(
                    point.address,
                    IndexEntry {
                        id: point.id.clone(),
                        address: point.address,
                        span,
                        access: point.access,
                        data_type: point.data_type,
                        length: point.length,
                    },
                );
            }
        }

        // overlap check per area: entries are address-sorted, adjacent spans
        // must not intersect
        for (area, entries) in &index {
            let mut prev: Option<(&u16, &IndexEntry)> = None;
            for (start, entry) in entries {
                if let Some((prev_start, prev_entry)) = prev {
                    let prev_end = u32::from(*prev_start) + u32::from(prev_entry.span);
                    if prev_end > u32::from(*start) {
                        errors.push(format!(
                            "unit {unit_id} area {}: points '{}' and '{}' overlap at address {start}",
                            area.as_str(),
                            prev_entry.id,
                            entry.id
                        ));
                    }
                }
                prev = Some((start, entry));
            }
        }

        // feedback references: target exists, type-compatible, no 2-cycle
        for point in by_id.values() {
            let Some(target_id) = &point.feedback_point else {
                continue;
            };
            match by_id.get(target_id) {
                None => errors.push(format!(
                    "unit {unit_id}: point '{}' feedback references unknown point '{target_id}'",
                    point.id
                )),
                Some(target) => {
                    if !super::value::feedback_compatible(point.data_type, target.data_type) {
                        errors.push(format!(
                            "unit {unit_id}: point '{}' ({}) cannot feed '{}' ({})",
                            point.id,
                            point.data_type.as_str(),
                            target.id,
                            target.data_type.as_str()
                        ));
                    }
                    if target.feedback_point.as_deref() == Some(point.id.as_str()) {
                        errors.push(format!(
                            "unit {unit_id}: feedback cycle between '{}' and '{}'",
                            point.id, target.id
                        ));
                    }
                },
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            unit_id,
            index,
            points: RwLock::new(by_id),
        })
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// Resolve `(area, address, count)` to the contiguous sequence of points
    /// covering exactly that range, in ascending address order.
    ///
    /// Fails with `IllegalDataAddress` when any addressed register/bit is
    /// unbacked, or when a multi-register point is split by the range
    /// boundary.
    pub fn resolve(
        &self,
        area: DataArea,
        address: u16,
        count: u16,
    ) -> Result<Vec<ResolvedPoint>, ExceptionCode> {
        Ok(self
            .resolve_refs(area, address, count)?
            .into_iter()
            .map(|entry| ResolvedPoint {
                id: entry.id.clone(),
                address: entry.address,
                span: entry.span,
            })
            .collect())
    }

    fn resolve_refs(
        &self,
        area: DataArea,
        address: u16,
        count: u16,
    ) -> Result<Vec<&IndexEntry>, ExceptionCode> {
        let entries = self
            .index
            .get(&area)
            .ok_or(ExceptionCode::IllegalDataAddress)?;

        let start = u32::from(address);
        let end = start + u32::from(count);
        let mut resolved = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let (point_start, entry) = entries
                .range(..=(cursor as u16))
                .next_back()
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            let point_start = u32::from(*point_start);
            let point_end = point_start + u32::from(entry.span);

            if point_end <= cursor {
                // gap: the nearest point below the cursor ends before it
                return Err(ExceptionCode::IllegalDataAddress);
            }
            if point_start < start || point_end > end {
                // the range would split a multi-register point
                return Err(ExceptionCode::IllegalDataAddress);
            }

            resolved.push(entry);
            cursor = point_end;
        }

        Ok(resolved)
    }

    /// Read `count` register words starting at `address`
    pub fn read_registers(
        &self,
        area: DataArea,
        address: u16,
        count: u16,
        endian: Endianness,
    ) -> Result<Vec<u16>, ExceptionCode> {
        let refs = self.resolve_refs(area, address, count)?;
        if refs.iter().any(|r| !r.access.readable()) {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let points = self.points.read();
        let mut words = Vec::with_capacity(count as usize);
        for r in &refs {
            let point = points
                .get(&r.id)
                .ok_or(ExceptionCode::ServerDeviceFailure)?;
            words.extend(codec::encode(&point.value, point.length, endian));
        }
        Ok(words)
    }

    /// Write register words starting at `address`, atomically with feedback
    pub fn write_registers(
        &self,
        area: DataArea,
        address: u16,
        words: &[u16],
        endian: Endianness,
    ) -> Result<(), ExceptionCode> {
        let refs = self.resolve_refs(area, address, words.len() as u16)?;
        if refs.iter().any(|r| !r.access.writable()) {
            return Err(ExceptionCode::IllegalDataValue);
        }

        // decode everything before taking the lock so the whole request is
        // applied as one atomic unit or not at all
        let mut staged = Vec::with_capacity(refs.len());
        let mut offset = 0usize;
        for r in &refs {
            let slice = &words[offset..offset + r.span as usize];
            let value =
                codec::decode(r.data_type, r.length, slice, endian).map_err(|e| match e {
                    CodecError::OutOfRange { .. } => ExceptionCode::IllegalDataValue,
                    CodecError::ShortInput { .. } => ExceptionCode::ServerDeviceFailure,
                })?;
            staged.push((r.id.clone(), value));
            offset += r.span as usize;
        }

        let mut points = self.points.write();
        for (id, value) in staged {
            if let Some(point) = points.get_mut(&id) {
                point.value = value;
            }
            Self::propagate(&mut points, &id);
        }
        Ok(())
    }

    /// Read `count` bits starting at `address`
    pub fn read_bits(
        &self,
        area: DataArea,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, ExceptionCode> {
        let refs = self.resolve_refs(area, address, count)?;
        if refs.iter().any(|r| !r.access.readable()) {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let points = self.points.read();
        let mut bits = Vec::with_capacity(count as usize);
        for r in &refs {
            let point = points
                .get(&r.id)
                .ok_or(ExceptionCode::ServerDeviceFailure)?;
            bits.push(point.value.truthy());
        }
        Ok(bits)
    }

    /// Write bits starting at `address`, atomically with feedback
    pub fn write_bits(
        &self,
        area: DataArea,
        address: u16,
        bits: &[bool],
    ) -> Result<(), ExceptionCode> {
        let refs = self.resolve_refs(area, address, bits.len() as u16)?;
        if refs.iter().any(|r| !r.access.writable()) {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let mut points = self.points.write();
        for (r, bit) in refs.iter().zip(bits) {
            if let Some(point) = points.get_mut(&r.id) {
                point.value = DataValue::Bool(*bit);
            }
            Self::propagate(&mut points, &r.id);
        }
        Ok(())
    }

    /// Copy a freshly written value into its feedback target.
    ///
    /// Exactly one level: the target's own feedback link is not chased.
    /// Configuration validation guarantees the target exists and converts.
    fn propagate(points: &mut BTreeMap<String, DataPoint>, source_id: &str) {
        let Some((target_id, value)) = points.get(source_id).and_then(|p| {
            p.feedback_point
                .as_ref()
                .map(|t| (t.clone(), p.value.clone()))
        }) else {
            return;
        };

        if let Some(target) = points.get_mut(&target_id) {
            if let Some(converted) = value.convert_to(target.data_type) {
                target.value = converted;
            }
        }
    }

    /// Draw new values for every simulation-enabled point and run feedback.
    ///
    /// Returns the number of points updated. Takes the unit lock once for
    /// the whole tick.
    pub fn apply_simulation(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut points = self.points.write();

        let ids: Vec<String> = points
            .values()
            .filter(|p| p.simulation.is_some_and(|s| s.enabled))
            .map(|p| p.id.clone())
            .collect();

        for id in &ids {
            let Some(point) = points.get(id) else {
                continue;
            };
            let Some(sim) = point.simulation else {
                continue;
            };
            let draw = if sim.min_value >= sim.max_value {
                sim.min_value
            } else {
                rng.gen_range(sim.min_value..=sim.max_value)
            };
            let value = point.data_type.value_from_f64(draw);

            if let Some(point) = points.get_mut(id) {
                point.value = value;
            }
            Self::propagate(&mut points, id);
        }

        ids.len()
    }

    /// Whether any point on this unit generates synthetic values
    pub fn has_simulation(&self) -> bool {
        self.points
            .read()
            .values()
            .any(|p| p.simulation.is_some_and(|s| s.enabled))
    }

    /// Current value of a point, by id
    pub fn point_value(&self, id: &str) -> Option<DataValue> {
        self.points.read().get(id).map(|p| p.value.clone())
    }

    /// Ids of all points on this unit, address-independent order
    pub fn point_ids(&self) -> Vec<String> {
        self.points.read().keys().cloned().collect()
    }

    /// Reset every point back to its configured seed value
    pub fn reset_values(&self) {
        for point in self.points.write().values_mut() {
            point.reset();
        }
    }
}
