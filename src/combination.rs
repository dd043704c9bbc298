/// Cartesian product of `a` and `b`, `a`-major and `b`-minor.
pub fn combination(a: &[i64], b: &[i64]) -> Vec<(i64, i64)> {
    let mut pairs = Vec::with_capacity(a.len() * b.len());
    for &left in a {
        for &right in b {
            pairs.push((left, right));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn a_major_b_minor_order() {
        assert_eq!(
            combination(&[1, 2], &[7, 8]),
            vec![(1, 7), (1, 8), (2, 7), (2, 8)]
        );
    }

    #[test]
    fn empty_side_yields_nothing() {
        assert!(combination(&[], &[7, 8]).is_empty());
        assert!(combination(&[1, 2], &[]).is_empty());
        assert!(combination(&[], &[]).is_empty());
    }

    proptest! {
        #[test]
        fn covers_full_product_without_duplicates(
            a in prop::collection::hash_set(any::<i64>(), 0..12),
            b in prop::collection::hash_set(any::<i64>(), 0..12),
        ) {
            let a: Vec<i64> = a.into_iter().collect();
            let b: Vec<i64> = b.into_iter().collect();
            let pairs = combination(&a, &b);

            prop_assert_eq!(pairs.len(), a.len() * b.len());
            let unique: HashSet<_> = pairs.iter().copied().collect();
            prop_assert_eq!(unique.len(), pairs.len());
            for x in &a {
                for y in &b {
                    prop_assert!(unique.contains(&(*x, *y)));
                }
            }
        }
    }
}
