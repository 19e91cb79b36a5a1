// Utility functions for persona-engine

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// FNV-1a hash of an identifier folded into [0, 1).
///
/// Stable across builds and platforms, unlike `DefaultHasher`.
pub fn hash_to_unit(id: &str) -> f32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % 10_000) as f32 / 10_000.0
}

/// Normalize counts into a distribution; all-zero input stays all-zero
pub fn to_distribution<const N: usize>(counts: &[u32; N]) -> [f32; N] {
    let total: u32 = counts.iter().sum();
    let mut out = [0.0f32; N];
    if total == 0 {
        return out;
    }
    for (slot, &count) in out.iter_mut().zip(counts.iter()) {
        *slot = count as f32 / total as f32;
    }
    out
}

/// Index of the largest value (first one on ties)
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[4.0]), 0.0);
        assert!((variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_hash_to_unit_is_stable() {
        let a = hash_to_unit("stardew-valley");
        assert_eq!(a, hash_to_unit("stardew-valley"));
        assert!((0.0..1.0).contains(&a));
        assert_ne!(a, hash_to_unit("doom-eternal"));
    }

    #[test]
    fn test_to_distribution() {
        let dist = to_distribution(&[1, 3, 0, 0]);
        assert!((dist[0] - 0.25).abs() < 1e-6);
        assert!((dist[1] - 0.75).abs() < 1e-6);
        assert_eq!(to_distribution(&[0u32; 3]), [0.0; 3]);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[]), None);
    }
}
