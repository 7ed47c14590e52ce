//! OpenStreetMap PBF input.
//!
//! Three passes over the file:
//!   A  relations: `type=multipolygon` + `building=*`, remember outer ways
//!   B  ways:      closed `building=*` ways, plus the ways from pass A
//!   C  nodes:     coordinates of every node referenced in pass B
//!
//! Relation outer ways are chained end to end into closed rings. Rings with
//! unresolved nodes are dropped.

use std::path::Path;
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use log::{debug, info, warn};
use nohash_hasher::BuildNoHashHasher;
use osmpbf::{Element, ElementReader, RelMemberType};
use smallvec::SmallVec;

use super::{FeatureSet, Footprint};
use crate::error::{Error, Result};
use crate::tags::{is_building, Tags};

type IdSet = HashSet<i64, BuildNoHashHasher<i64>>;
type IdMap<V> = HashMap<i64, V, BuildNoHashHasher<i64>>;

const LOG_EVERY: usize = 1 << 20;
const LOG_INTERVAL: Duration = Duration::from_millis(200);

/// Element counter of one reader pass, logging throughput as it goes.
struct PassProgress {
    pass: &'static str,
    seen: usize,
    started: Instant,
    logged: Instant,
}

impl PassProgress {
    fn new(pass: &'static str) -> Self {
        let now = Instant::now();
        Self {
            pass,
            seen: 0,
            started: now,
            logged: now,
        }
    }

    /// Count one element of the pass; `kept` is what the pass has retained.
    #[inline]
    fn step(&mut self, kept: usize) {
        self.seen += 1;
        if self.seen % LOG_EVERY != 0 || self.logged.elapsed() < LOG_INTERVAL {
            return;
        }

        let secs = self.started.elapsed().as_secs_f64().max(1e-9);
        info!(
            "{}: seen {:>11}, kept {:>11}, rate {:5.2} M/s",
            self.pass,
            self.seen,
            kept,
            self.seen as f64 / 1_000_000.0 / secs
        );
        self.logged = Instant::now();
    }
}

struct BuildingRelation {
    id: i64,
    tags: Tags,
    outer: SmallVec<[i64; 4]>,
}

struct BuildingWay {
    id: i64,
    tags: Tags,
    refs: Vec<i64>,
}

fn collect_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.map(|(k, v)| (k.to_owned(), v.to_owned())).collect()
}

pub fn read_pbf<P: AsRef<Path>>(path: P) -> Result<FeatureSet> {
    let path = path.as_ref();
    let input_error = |e: osmpbf::Error| Error::Input {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    // Pass A: building multipolygons.
    let mut relations = Vec::new();
    let mut member_ways = IdSet::default();

    ElementReader::from_path(path)
        .map_err(input_error)?
        .for_each(|elem| {
            let Element::Relation(rel) = elem else {
                return;
            };

            let tags = collect_tags(rel.tags());
            if tags.get("type").map(String::as_str) != Some("multipolygon") || !is_building(&tags)
            {
                return;
            }

            let outer: SmallVec<[i64; 4]> = rel
                .members()
                .filter(|m| m.member_type == RelMemberType::Way)
                .filter(|m| matches!(m.role(), Ok("outer") | Ok("")))
                .map(|m| m.member_id)
                .collect();

            member_ways.extend(outer.iter().copied());
            relations.push(BuildingRelation {
                id: rel.id(),
                tags,
                outer,
            });
        })
        .map_err(input_error)?;

    info!(
        "Pass A: {} building relations, {} member ways",
        relations.len(),
        member_ways.len()
    );

    // Pass B: building ways and relation members.
    let mut ways = Vec::new();
    let mut member_refs: IdMap<Vec<i64>> = IdMap::default();
    let mut needed_nodes = IdSet::default();
    let mut progress = PassProgress::new("Pass B ways");

    ElementReader::from_path(path)
        .map_err(input_error)?
        .for_each(|elem| {
            let Element::Way(way) = elem else {
                return;
            };

            let id = way.id();
            let is_member = member_ways.contains(&id);

            if is_member {
                let refs: Vec<i64> = way.refs().collect();
                needed_nodes.extend(refs.iter().copied());
                member_refs.insert(id, refs);
            } else {
                let tags = collect_tags(way.tags());
                if is_building(&tags) {
                    let refs: Vec<i64> = way.refs().collect();
                    if refs.len() >= 4 && refs.first() == refs.last() {
                        needed_nodes.extend(refs.iter().copied());
                        ways.push(BuildingWay { id, tags, refs });
                    } else {
                        debug!("way/{id}: building outline is not closed");
                    }
                }
            }

            progress.step(ways.len() + member_refs.len());
        })
        .map_err(input_error)?;

    info!(
        "Pass B: {} of {} ways are buildings, {} nodes referenced",
        ways.len(),
        progress.seen,
        needed_nodes.len()
    );

    // Pass C: node coordinates.
    let mut nodes: IdMap<[f64; 2]> = IdMap::default();
    nodes.reserve(needed_nodes.len());
    let mut progress = PassProgress::new("Pass C nodes");

    ElementReader::from_path(path)
        .map_err(input_error)?
        .for_each(|elem| {
            let (id, lon, lat) = match elem {
                Element::Node(node) => (node.id(), node.lon(), node.lat()),
                Element::DenseNode(dn) => (dn.id(), dn.lon(), dn.lat()),
                _ => return,
            };
            if needed_nodes.contains(&id) {
                nodes.insert(id, [lon, lat]);
            }
            progress.step(nodes.len());
        })
        .map_err(input_error)?;

    debug!("Pass C: {} of {} nodes kept", nodes.len(), progress.seen);

    let footprints = assemble(ways, relations, &member_refs, &nodes);
    let set = FeatureSet::from_footprints(footprints);

    info!(
        "{}: {} building footprints, {} rings",
        path.display(),
        set.footprints.len(),
        set.ring_count()
    );
    Ok(set)
}

fn assemble(
    ways: Vec<BuildingWay>,
    relations: Vec<BuildingRelation>,
    member_refs: &IdMap<Vec<i64>>,
    nodes: &IdMap<[f64; 2]>,
) -> Vec<Footprint> {
    let mut footprints = Vec::with_capacity(ways.len() + relations.len());

    for way in ways {
        let source_id = format!("way/{}", way.id);
        if let Some(ring) = resolve(&source_id, &way.refs, nodes) {
            footprints.push(Footprint {
                source_id,
                rings: vec![ring],
                tags: way.tags,
            });
        }
    }

    for rel in relations {
        let source_id = format!("relation/{}", rel.id);
        let parts: Vec<&[i64]> = rel
            .outer
            .iter()
            .filter_map(|id| {
                let refs = member_refs.get(id);
                if refs.is_none() {
                    warn!("{source_id}: member way/{id} not in input");
                }
                refs.map(Vec::as_slice)
            })
            .collect();

        let rings: Vec<Vec<[f64; 2]>> = chain_rings(&source_id, &parts)
            .iter()
            .filter_map(|refs| resolve(&source_id, refs, nodes))
            .collect();

        if rings.is_empty() {
            warn!("{source_id}: no usable outer ring");
            continue;
        }

        footprints.push(Footprint {
            source_id,
            rings,
            tags: rel.tags,
        });
    }

    footprints
}

/// Join way segments sharing end nodes into closed rings. Segments that never
/// close are dropped.
fn chain_rings(source_id: &str, parts: &[&[i64]]) -> Vec<Vec<i64>> {
    let mut open: Vec<Vec<i64>> = parts
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| p.to_vec())
        .collect();
    let mut rings = Vec::new();

    while let Some(mut ring) = open.pop() {
        loop {
            if ring.len() >= 4 && ring.first() == ring.last() {
                rings.push(ring);
                break;
            }

            let Some(&end) = ring.last() else {
                break;
            };
            let next = open
                .iter()
                .position(|p| p.first() == Some(&end) || p.last() == Some(&end));

            match next {
                Some(i) => {
                    let mut part = open.swap_remove(i);
                    if part.first() != Some(&end) {
                        part.reverse();
                    }
                    ring.extend_from_slice(&part[1..]);
                }
                None => {
                    warn!(
                        "{source_id}: outer ring does not close ({} nodes)",
                        ring.len()
                    );
                    break;
                }
            }
        }
    }

    rings
}

fn resolve(source_id: &str, refs: &[i64], nodes: &IdMap<[f64; 2]>) -> Option<Vec<[f64; 2]>> {
    let ring: Option<Vec<[f64; 2]>> = refs.iter().map(|id| nodes.get(id).copied()).collect();
    if ring.is_none() {
        warn!("{source_id}: ring references nodes missing from the input");
    }
    ring
}
