//! Raster to polygon extraction.
//!
//! Every connected region of equal value among valid pixels becomes one
//! polygon, in pixel coordinates (`[column, row]`, origin at the top-left
//! corner of the tile). Region outlines are traced along pixel edges, so
//! every vertex has integer coordinates.
//!
//! Outer rings run clockwise on screen and holes counter-clockwise; the
//! first ring of each polygon is the outer one.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Pixel neighbourhood used to grow regions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Connectivity {
    /// Edge neighbours only
    #[default]
    Four,
    /// Edge and corner neighbours
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
            Connectivity::Eight => &[
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ],
        }
    }
}

/// A GeoJSON Polygon geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Polygon")]
pub struct Polygon {
    /// Closed rings, outer ring first
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    /// Area of the outer ring minus the holes, in pixels
    pub fn area(&self) -> f64 {
        self.coordinates
            .iter()
            .map(|ring| signed_area(ring))
            .sum()
    }
}

/// One extracted region
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub polygon: Polygon,
    pub value: u8,
}

type Vertex = (i64, i64);

/// Extract one polygon per connected region of equal value among `valid` pixels.
///
/// Regions are reported in scan order of their first (top-left) pixel.
pub fn shapes(
    values: ArrayView2<u8>,
    valid: ArrayView2<bool>,
    connectivity: Connectivity,
) -> Vec<Shape> {
    let (labels, region_values) = label_regions(values, valid, connectivity);
    let mut edges: Vec<Vec<(Vertex, Vertex)>> = vec![Vec::new(); region_values.len()];
    let (rows, cols) = labels.dim();

    let label_at = |r: isize, c: isize| -> Option<usize> {
        if r < 0 || c < 0 || r as usize >= rows || c as usize >= cols {
            None
        } else {
            labels[[r as usize, c as usize]]
        }
    };

    for ((r, c), label) in labels.indexed_iter() {
        let Some(label) = *label else { continue };
        let (ri, ci) = (r as isize, c as isize);
        let (x, y) = (c as i64, r as i64);
        if label_at(ri - 1, ci) != Some(label) {
            edges[label].push(((x, y), (x + 1, y)));
        }
        if label_at(ri, ci + 1) != Some(label) {
            edges[label].push(((x + 1, y), (x + 1, y + 1)));
        }
        if label_at(ri + 1, ci) != Some(label) {
            edges[label].push(((x + 1, y + 1), (x, y + 1)));
        }
        if label_at(ri, ci - 1) != Some(label) {
            edges[label].push(((x, y + 1), (x, y)));
        }
    }

    edges
        .into_iter()
        .zip(region_values)
        .map(|(region_edges, value)| Shape {
            polygon: assemble_polygon(trace_rings(&region_edges, connectivity)),
            value,
        })
        .collect()
}

/// Connected-component labelling with a breadth-first flood fill.
fn label_regions(
    values: ArrayView2<u8>,
    valid: ArrayView2<bool>,
    connectivity: Connectivity,
) -> (Array2<Option<usize>>, Vec<u8>) {
    let (rows, cols) = values.dim();
    let mut labels: Array2<Option<usize>> = Array2::from_elem((rows, cols), None);
    let mut region_values = Vec::new();
    let mut queue = VecDeque::new();

    for r in 0..rows {
        for c in 0..cols {
            if !valid[[r, c]] || labels[[r, c]].is_some() {
                continue;
            }
            let label = region_values.len();
            let value = values[[r, c]];
            region_values.push(value);
            labels[[r, c]] = Some(label);
            queue.push_back((r, c));

            while let Some((pr, pc)) = queue.pop_front() {
                for &(dr, dc) in connectivity.offsets() {
                    let nr = pr as isize + dr;
                    let nc = pc as isize + dc;
                    if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if valid[[nr, nc]] && labels[[nr, nc]].is_none() && values[[nr, nc]] == value
                    {
                        labels[[nr, nc]] = Some(label);
                        queue.push_back((nr, nc));
                    }
                }
            }
        }
    }
    (labels, region_values)
}

/// Link directed boundary edges into closed rings.
///
/// At a vertex where the region touches itself diagonally two edges leave;
/// four-connected regions turn right there (keeping the corner pixels apart),
/// eight-connected regions turn left (joining them).
fn trace_rings(edges: &[(Vertex, Vertex)], connectivity: Connectivity) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, (start, _)) in edges.iter().enumerate() {
        outgoing.entry(*start).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let origin = edges[first].0;
        let mut ring = vec![origin];
        let mut current = first;

        loop {
            let (from, to) = edges[current];
            if to == origin {
                break;
            }
            ring.push(to);
            let heading = (to.0 - from.0, to.1 - from.1);
            let candidates: Vec<usize> = outgoing
                .get(&to)
                .map(|list| list.iter().copied().filter(|&e| !used[e]).collect())
                .unwrap_or_default();

            let next = match candidates.as_slice() {
                [] => break,
                [only] => *only,
                many => {
                    let want_right = connectivity == Connectivity::Four;
                    many.iter()
                        .copied()
                        .find(|&e| {
                            let (a, b) = edges[e];
                            let turn = heading.0 * (b.1 - a.1) - heading.1 * (b.0 - a.0);
                            (turn > 0) == want_right
                        })
                        .unwrap_or(many[0])
                }
            };
            used[next] = true;
            current = next;
        }

        rings.push(simplify_ring(ring));
    }
    rings
}

/// Drop vertices in the middle of straight runs and close the ring.
fn simplify_ring(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    let mut kept: Vec<Vertex> = Vec::with_capacity(n + 1);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let here = ring[i];
        let next = ring[(i + 1) % n];
        let cross = (here.0 - prev.0) * (next.1 - here.1) - (here.1 - prev.1) * (next.0 - here.0);
        if cross != 0 {
            kept.push(here);
        }
    }
    if let Some(&first) = kept.first() {
        kept.push(first);
    }
    kept
}

fn signed_area(ring: &[[f64; 2]]) -> f64 {
    ring.windows(2)
        .map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1])
        .sum::<f64>()
        / 2.0
}

/// Outer ring (largest area) first, holes after, in trace order.
fn assemble_polygon(rings: Vec<Vec<Vertex>>) -> Polygon {
    let mut rings: Vec<Vec<[f64; 2]>> = rings
        .into_iter()
        .filter(|ring| ring.len() >= 4)
        .map(|ring| ring.into_iter().map(|(x, y)| [x as f64, y as f64]).collect())
        .collect();

    if let Some(outer) = rings
        .iter()
        .enumerate()
        .max_by(|a, b| signed_area(a.1).total_cmp(&signed_area(b.1)))
        .map(|(i, _)| i)
    {
        let ring = rings.remove(outer);
        rings.insert(0, ring);
    }
    Polygon {
        coordinates: rings,
    }
}
