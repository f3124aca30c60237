//! KPI computation: read-only Gini coefficient and Shannon
//! entropy over projection state. Neither is cached or incrementally
//! maintained — both are diagnostic outputs computed fresh from a read
//! transaction snapshot, never part of the replay-determinism contract.

use std::collections::HashMap;

use feedsim_core::UserId;
use itertools::Itertools as _;

use crate::errors::DbResult;
use crate::store::Store;
use crate::tables;

/// Gini coefficient of the `up_votes` distribution across all posts. `0.0`
/// for an empty post set or when every post has the same (possibly zero)
/// vote count.
pub async fn up_votes_gini(store: &Store) -> DbResult<f64> {
    let mut votes = store
        .read_with(|tx| {
            let table = tx.open_table(&tables::posts::TABLE)?;
            Ok(table
                .range(..)?
                .map_ok(|(_, v)| v.value().up_votes)
                .collect::<Result<Vec<_>, _>>()?)
        })
        .await?;

    Ok(gini(&mut votes))
}

/// Computes the Gini coefficient of a value distribution in place (sorts
/// `values`). Uses the standard mean-absolute-difference form:
/// `G = (2 * sum(i * x_i) / (n * sum(x_i))) - (n + 1) / n` for 1-indexed `i`
/// over ascending-sorted `x`.
fn gini(values: &mut [u64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sort_unstable();
    let total: u64 = values.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let weighted_sum: f64 = values
        .iter()
        .enumerate()
        .map(|(idx, &x)| ((idx + 1) as f64) * (x as f64))
        .sum();

    (2.0 * weighted_sum) / (n as f64 * total as f64) - (n as f64 + 1.0) / n as f64
}

/// Shannon entropy, base 2, of the posts-per-author distribution: how
/// concentrated authorship is across users. `0.0` when there are no posts
/// or exactly one author.
pub async fn author_entropy(store: &Store) -> DbResult<f64> {
    let authors: Vec<UserId> = store
        .read_with(|tx| {
            let table = tx.open_table(&tables::posts::TABLE)?;
            Ok(table
                .range(..)?
                .map_ok(|(_, v)| v.value().author_id)
                .collect::<Result<Vec<_>, _>>()?)
        })
        .await?;

    Ok(entropy_base2(&authors))
}

fn entropy_base2(authors: &[UserId]) -> f64 {
    let total = authors.len();
    if total == 0 {
        return 0.0;
    }

    let mut counts: HashMap<UserId, u64> = HashMap::new();
    for author in authors {
        *counts.entry(*author).or_insert(0) += 1;
    }

    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn gini_of_equal_distribution_is_zero() {
        let mut values = vec![5, 5, 5, 5];
        assert!((gini(&mut values)).abs() < 1e-9);
    }

    #[test_log::test]
    fn gini_of_empty_is_zero() {
        let mut values: Vec<u64> = vec![];
        assert_eq!(gini(&mut values), 0.0);
    }

    #[test_log::test]
    fn gini_of_total_inequality_approaches_one() {
        let mut values = vec![0, 0, 0, 100];
        let g = gini(&mut values);
        assert!(g > 0.6, "expected highly unequal distribution, got {g}");
    }

    #[test_log::test]
    fn entropy_of_single_author_is_zero() {
        let authors = vec![UserId(1), UserId(1), UserId(1)];
        assert_eq!(entropy_base2(&authors), 0.0);
    }

    #[test_log::test]
    fn entropy_of_even_split_is_one_bit_for_two_authors() {
        let authors = vec![UserId(1), UserId(2)];
        assert!((entropy_base2(&authors) - 1.0).abs() < 1e-9);
    }
}
