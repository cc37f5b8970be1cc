//! # Position mapping
//!
//! A [`StepMap`] records which ranges a single step replaced; a [`Mapping`]
//! chains several of them. Mapping a position through a replaced range moves
//! it to one side of the replacement, chosen by `assoc`.

const DEL_BEFORE: u8 = 1;
const DEL_AFTER: u8 = 2;
const DEL_ACROSS: u8 = 4;
const DEL_SIDE: u8 = 8;

/// A replaced range: `old_size` positions at `start` became `new_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRange {
    pub start: usize,
    pub old_size: usize,
    pub new_size: usize,
}

/// Result of mapping a position, with information about deletions around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    del_info: u8,
}

impl MapResult {
    fn new(pos: usize, del_info: u8) -> Self {
        Self { pos, del_info }
    }

    /// The position was deleted on the side `assoc` points to.
    pub fn deleted(&self) -> bool {
        self.del_info & DEL_SIDE > 0
    }

    pub fn deleted_before(&self) -> bool {
        self.del_info & (DEL_BEFORE | DEL_ACROSS) > 0
    }

    pub fn deleted_after(&self) -> bool {
        self.del_info & (DEL_AFTER | DEL_ACROSS) > 0
    }

    /// The position sat strictly inside a deleted range.
    pub fn deleted_across(&self) -> bool {
        self.del_info & DEL_ACROSS > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap {
    ranges: Vec<MapRange>,
    inverted: bool,
}

impl StepMap {
    pub fn new(ranges: Vec<MapRange>) -> Self {
        Self {
            ranges: ranges
                .into_iter()
                .filter(|r| r.old_size > 0 || r.new_size > 0)
                .collect(),
            inverted: false,
        }
    }

    pub fn single(start: usize, old_size: usize, new_size: usize) -> Self {
        Self::new(vec![MapRange {
            start,
            old_size,
            new_size,
        }])
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn invert(&self) -> StepMap {
        StepMap {
            ranges: self.ranges.clone(),
            inverted: !self.inverted,
        }
    }

    fn sizes(&self, range: &MapRange) -> (usize, usize) {
        if self.inverted {
            (range.new_size, range.old_size)
        } else {
            (range.old_size, range.new_size)
        }
    }

    pub fn map(&self, pos: usize, assoc: i32) -> usize {
        self.map_result(pos, assoc).pos
    }

    pub fn map_result(&self, pos: usize, assoc: i32) -> MapResult {
        let mut diff: isize = 0;
        for range in &self.ranges {
            let start = if self.inverted {
                offset(range.start, -diff)
            } else {
                range.start
            };
            if start > pos {
                break;
            }
            let (old_size, new_size) = self.sizes(range);
            let end = start + old_size;
            if pos <= end {
                let side = if old_size == 0 {
                    assoc
                } else if pos == start {
                    -1
                } else if pos == end {
                    1
                } else {
                    assoc
                };
                let result = offset(start, diff) + if side < 0 { 0 } else { new_size };
                let mut del = if pos == start {
                    DEL_AFTER
                } else if pos == end {
                    DEL_BEFORE
                } else {
                    DEL_ACROSS
                };
                let on_side = if assoc < 0 { pos != start } else { pos != end };
                if on_side {
                    del |= DEL_SIDE;
                }
                return MapResult::new(result, del);
            }
            diff += new_size as isize - old_size as isize;
        }
        MapResult::new(offset(pos, diff), 0)
    }

    /// Call `f(old_start, old_end, new_start, new_end)` for every changed range.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        let mut diff: isize = 0;
        for range in &self.ranges {
            let (old_size, new_size) = self.sizes(range);
            let old_start = if self.inverted {
                offset(range.start, -diff)
            } else {
                range.start
            };
            let new_start = if self.inverted {
                range.start
            } else {
                offset(range.start, diff)
            };
            f(
                old_start,
                old_start + old_size,
                new_start,
                new_start + new_size,
            );
            diff += new_size as isize - old_size as isize;
        }
    }
}

fn offset(pos: usize, diff: isize) -> usize {
    (pos as isize + diff).max(0) as usize
}

/// A pipeline of step maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(maps: Vec<StepMap>) -> Self {
        Self { maps }
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn append_map(&mut self, map: StepMap) {
        self.maps.push(map);
    }

    /// The maps from index `from` onwards.
    pub fn slice(&self, from: usize) -> Mapping {
        Mapping {
            maps: self.maps.get(from..).map(|m| m.to_vec()).unwrap_or_default(),
        }
    }

    /// Mapping that undoes this one.
    pub fn invert(&self) -> Mapping {
        Mapping {
            maps: self.maps.iter().rev().map(StepMap::invert).collect(),
        }
    }

    pub fn map(&self, pos: usize, assoc: i32) -> usize {
        self.maps.iter().fold(pos, |pos, map| map.map(pos, assoc))
    }

    pub fn map_result(&self, pos: usize, assoc: i32) -> MapResult {
        let mut del_info = 0;
        let mut pos = pos;
        for map in &self.maps {
            let result = map.map_result(pos, assoc);
            del_info |= result.del_info;
            pos = result.pos;
        }
        MapResult::new(pos, del_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_past_deletion() {
        let map = StepMap::single(2, 3, 0);
        assert_eq!(map.map(1, 1), 1);
        assert_eq!(map.map(10, 1), 7);
        let inside = map.map_result(3, 1);
        assert_eq!(inside.pos, 2);
        assert!(inside.deleted());
        assert!(inside.deleted_across());
    }

    #[test]
    fn test_insertion_respects_assoc() {
        let map = StepMap::single(4, 0, 2);
        assert_eq!(map.map(4, -1), 4);
        assert_eq!(map.map(4, 1), 6);
        assert!(!map.map_result(4, 1).deleted());
    }

    #[test]
    fn test_inverted_map_round_trips() {
        let map = StepMap::single(2, 3, 1);
        let inv = map.invert();
        assert_eq!(inv.map(map.map(8, 1), 1), 8);
    }

    #[test]
    fn test_mapping_slice_and_accumulate() {
        let mut mapping = Mapping::new();
        mapping.append_map(StepMap::single(0, 0, 2));
        mapping.append_map(StepMap::single(5, 1, 0));
        assert_eq!(mapping.map(4, 1), 5);
        assert_eq!(mapping.slice(1).map(4, 1), 4);
        assert!(mapping.map_result(4, -1).deleted());
        assert!(!mapping.map_result(4, 1).deleted());
    }

    #[test]
    fn test_for_each_reports_ranges() {
        let map = StepMap::new(vec![
            MapRange {
                start: 1,
                old_size: 1,
                new_size: 0,
            },
            MapRange {
                start: 5,
                old_size: 1,
                new_size: 0,
            },
        ]);
        let mut seen = Vec::new();
        map.for_each(|a, b, c, d| seen.push((a, b, c, d)));
        assert_eq!(seen, vec![(1, 2, 1, 1), (5, 6, 4, 4)]);
    }
}
