use crate::features::{Descriptor, FeatureBackend};

/// Correspondence between a query descriptor and a train descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

/// Index and distance of the closest descriptor in `set`; first wins ties.
fn nearest<B: FeatureBackend + ?Sized>(
    backend: &B,
    d: &Descriptor,
    set: &[Descriptor],
) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, other) in set.iter().enumerate() {
        let dist = backend.distance(d, other);
        if best.map_or(true, |(_, b)| dist < b) {
            best = Some((i, dist));
        }
    }
    best
}

/// Brute-force matching keeping only mutually nearest pairs.
pub fn cross_check_matches<B: FeatureBackend + ?Sized>(
    backend: &B,
    query: &[Descriptor],
    train: &[Descriptor],
) -> Vec<DescriptorMatch> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let reverse: Vec<Option<usize>> = train
        .iter()
        .map(|t| nearest(backend, t, query).map(|(i, _)| i))
        .collect();

    query
        .iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let (ti, distance) = nearest(backend, q, train)?;
            (reverse[ti] == Some(qi)).then_some(DescriptorMatch {
                query_idx: qi,
                train_idx: ti,
                distance,
            })
        })
        .collect()
}

/// 2-NN matching with Lowe's ratio test: a match survives only when its
/// distance is strictly below `ratio` times the second-best distance.
pub fn knn_ratio_matches<B: FeatureBackend + ?Sized>(
    backend: &B,
    query: &[Descriptor],
    train: &[Descriptor],
    ratio: f64,
) -> Vec<DescriptorMatch> {
    if train.len() < 2 {
        return Vec::new();
    }

    let mut good = Vec::new();
    for (qi, q) in query.iter().enumerate() {
        let mut first: Option<(usize, u32)> = None;
        let mut second: Option<u32> = None;
        for (ti, t) in train.iter().enumerate() {
            let dist = backend.distance(q, t);
            match first {
                Some((_, best)) if dist >= best => {
                    if second.map_or(true, |s| dist < s) {
                        second = Some(dist);
                    }
                }
                _ => {
                    second = first.map(|(_, best)| best);
                    first = Some((ti, dist));
                }
            }
        }

        if let (Some((ti, best)), Some(second)) = (first, second) {
            if (best as f64) < ratio * second as f64 {
                good.push(DescriptorMatch {
                    query_idx: qi,
                    train_idx: ti,
                    distance: best,
                });
            }
        }
    }
    good
}

/// Mean distance over a match list, or `None` when it is empty.
pub fn mean_distance(matches: &[DescriptorMatch]) -> Option<f64> {
    if matches.is_empty() {
        return None;
    }
    Some(matches.iter().map(|m| m.distance as f64).sum::<f64>() / matches.len() as f64)
}
