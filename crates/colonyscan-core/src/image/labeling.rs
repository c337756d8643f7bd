use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Pixel connectivity used when grouping foreground pixels into objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    /// Orthogonal neighbors only.
    Four,
    /// Orthogonal plus diagonal neighbors.
    #[default]
    Eight,
}

/// Per-object statistics computed from a label matrix.
#[derive(Clone, Debug)]
pub struct RegionStats {
    pub label: u32,
    /// Number of pixels carrying this label.
    pub area: usize,
    /// Inclusive bounding box: (min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize),
    /// Unweighted centroid (row, col).
    pub centroid: (f64, f64),
}

impl RegionStats {
    pub fn bbox_height(&self) -> usize {
        self.bbox.1 - self.bbox.0 + 1
    }

    pub fn bbox_width(&self) -> usize {
        self.bbox.3 - self.bbox.2 + 1
    }

    /// True when the bounding box touches any edge of an image with the
    /// given dimensions.
    pub fn touches_border(&self, height: usize, width: usize) -> bool {
        let (min_row, max_row, min_col, max_col) = self.bbox;
        min_row == 0 || max_row + 1 >= height || min_col == 0 || max_col + 1 >= width
    }
}

/// Label connected components of a binary mask using two-pass union-find.
///
/// Labels are compacted to `1..=n` in raster-scan order of first appearance,
/// so the result is always a dense positive label set with 0 as background.
pub fn label_components(mask: &Array2<bool>, connectivity: Connectivity) -> Array2<u32> {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    if h == 0 || w == 0 {
        return labels;
    }

    let mut next_label: u32 = 1;
    // Union-find parent array. Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0; h * w / 2 + 2];

    // Pass 1: assign provisional labels from already-visited neighbors.
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            let mut neighbor_labels = [0u32; 4];
            let mut n = 0;
            if col > 0 {
                neighbor_labels[n] = labels[[row, col - 1]];
                n += 1;
            }
            if row > 0 {
                neighbor_labels[n] = labels[[row - 1, col]];
                n += 1;
                if connectivity == Connectivity::Eight {
                    if col > 0 {
                        neighbor_labels[n] = labels[[row - 1, col - 1]];
                        n += 1;
                    }
                    if col + 1 < w {
                        neighbor_labels[n] = labels[[row - 1, col + 1]];
                        n += 1;
                    }
                }
            }

            let mut assigned = 0u32;
            for &nl in &neighbor_labels[..n] {
                if nl == 0 {
                    continue;
                }
                if assigned == 0 {
                    assigned = nl;
                } else if assigned != nl {
                    union(&mut parent, assigned, nl);
                    assigned = assigned.min(nl);
                }
            }

            if assigned == 0 {
                if next_label as usize >= parent.len() {
                    parent.resize(parent.len() * 2, 0);
                }
                parent[next_label as usize] = next_label;
                assigned = next_label;
                next_label += 1;
            }
            labels[[row, col]] = assigned;
        }
    }

    // Flatten parent references.
    for i in 1..next_label as usize {
        parent[i] = find(&parent, i as u32);
    }

    // Pass 2: resolve roots and compact to sequential labels in scan order.
    let mut compact: Vec<u32> = vec![0; next_label as usize];
    let mut next_compact: u32 = 1;
    for row in 0..h {
        for col in 0..w {
            let provisional = labels[[row, col]];
            if provisional == 0 {
                continue;
            }
            let root = parent[provisional as usize] as usize;
            if compact[root] == 0 {
                compact[root] = next_compact;
                next_compact += 1;
            }
            labels[[row, col]] = compact[root];
        }
    }

    labels
}

/// Tabulate area, bounding box, and centroid for every distinct positive
/// label in a label matrix, ordered by ascending label. Labels are taken as
/// given; pixels sharing a label need not be connected.
pub fn region_stats(map: &Array2<u32>) -> Vec<RegionStats> {
    let mut stats: Vec<RegionStats> = Vec::new();
    let mut index_of: std::collections::HashMap<u32, usize> = std::collections::HashMap::new();
    let mut coord_sums: Vec<(f64, f64)> = Vec::new();

    for ((row, col), &label) in map.indexed_iter() {
        if label == 0 {
            continue;
        }
        let idx = *index_of.entry(label).or_insert_with(|| {
            stats.push(RegionStats {
                label,
                area: 0,
                bbox: (row, row, col, col),
                centroid: (0.0, 0.0),
            });
            coord_sums.push((0.0, 0.0));
            stats.len() - 1
        });

        let entry = &mut stats[idx];
        entry.area += 1;
        entry.bbox.0 = entry.bbox.0.min(row);
        entry.bbox.1 = entry.bbox.1.max(row);
        entry.bbox.2 = entry.bbox.2.min(col);
        entry.bbox.3 = entry.bbox.3.max(col);
        coord_sums[idx].0 += row as f64;
        coord_sums[idx].1 += col as f64;
    }

    for (entry, sums) in stats.iter_mut().zip(coord_sums.iter()) {
        entry.centroid = (sums.0 / entry.area as f64, sums.1 / entry.area as f64);
    }

    stats.sort_unstable_by_key(|s| s.label);
    stats
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Merge larger root into smaller root to keep labels consistent.
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn two_separate_blobs_get_two_labels() {
        let mask = array![
            [true, true, false, false],
            [true, false, false, true],
            [false, false, false, true],
        ];
        let labels = label_components(&mask, Connectivity::Four);
        assert_eq!(labels[[0, 0]], 1);
        assert_eq!(labels[[1, 0]], 1);
        assert_eq!(labels[[1, 3]], 2);
        assert_eq!(labels[[2, 3]], 2);
    }

    #[test]
    fn diagonal_join_depends_on_connectivity() {
        let mask = array![[true, false], [false, true]];
        let four = label_components(&mask, Connectivity::Four);
        assert_ne!(four[[0, 0]], four[[1, 1]]);
        let eight = label_components(&mask, Connectivity::Eight);
        assert_eq!(eight[[0, 0]], eight[[1, 1]]);
    }

    #[test]
    fn u_shape_merges_into_one_label() {
        let mask = array![
            [true, false, true],
            [true, false, true],
            [true, true, true],
        ];
        let labels = label_components(&mask, Connectivity::Four);
        let distinct: std::collections::HashSet<u32> =
            labels.iter().copied().filter(|&l| l != 0).collect();
        assert_eq!(distinct.len(), 1);
    }

    #[test]
    fn region_stats_reports_area_bbox_centroid() {
        let map = array![[0u32, 3, 3], [0, 3, 3], [7, 0, 0]];
        let stats = region_stats(&map);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].label, 3);
        assert_eq!(stats[0].area, 4);
        assert_eq!(stats[0].bbox, (0, 1, 1, 2));
        assert_eq!(stats[0].centroid, (0.5, 1.5));
        assert_eq!(stats[1].label, 7);
        assert_eq!(stats[1].area, 1);
    }
}
