use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::{
    config::{BOUNDARY_YEAR_RANGE, ConfigError},
    error::{RetentionError, RetentionResult},
};

/// Partition ordinal of `value` under RANGE RIGHT boundaries.
///
/// A boundary belongs to the partition it starts, so
/// `ordinal = 1 + |{b : b <= value}|` and ordinals run from 1 to `len + 1`.
/// `boundaries` must be ascending.
pub fn range_right_ordinal(boundaries: &[NaiveDateTime], value: NaiveDateTime) -> u32 {
    1 + boundaries.partition_point(|b| *b <= value) as u32
}

/// Midnight of January 1st of `year`.
pub fn year_start(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Strictly increasing yearly boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionBoundarySet {
    years: Vec<i32>,
    boundaries: Vec<NaiveDateTime>,
}

impl RetentionBoundarySet {
    /// Invalid sets are configuration errors.
    pub fn from_years(years: &[i32]) -> RetentionResult<Self> {
        if years.is_empty() {
            return Err(invalid("a boundary set needs at least one year".into()));
        }
        if let Some(pair) = years.windows(2).find(|w| w[0] >= w[1]) {
            return Err(invalid(format!(
                "boundary years must be strictly increasing ({} is followed by {})",
                pair[0], pair[1]
            )));
        }
        let boundaries = years
            .iter()
            .map(|&year| {
                year_start(year)
                    .filter(|_| BOUNDARY_YEAR_RANGE.contains(&year))
                    .ok_or_else(|| invalid(format!("boundary year {year} is out of range")))
            })
            .collect::<RetentionResult<Vec<_>>>()?;

        Ok(Self {
            years: years.to_vec(),
            boundaries,
        })
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn boundaries(&self) -> &[NaiveDateTime] {
        &self.boundaries
    }

    pub fn partition_count(&self) -> u32 {
        self.boundaries.len() as u32 + 1
    }

    pub fn ordinal_for(&self, value: NaiveDateTime) -> u32 {
        range_right_ordinal(&self.boundaries, value)
    }

    /// Ordinal of the partition starting at `year`, if `year` is a boundary.
    pub fn ordinal_for_year(&self, year: i32) -> Option<u32> {
        let index = self.years.iter().position(|&y| y == year)?;
        Some(index as u32 + 2)
    }
}

fn invalid(message: String) -> RetentionError {
    RetentionError::Configuration(ConfigError::Validation(message))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn set() -> RetentionBoundarySet {
        RetentionBoundarySet::from_years(&[2022, 2023, 2024]).unwrap()
    }

    #[rstest]
    #[case::before_first(at(2021, 6, 1), 1)]
    #[case::inside_first_year(at(2022, 7, 1), 2)]
    #[case::inside_second_year(at(2023, 12, 31), 3)]
    #[case::after_last(at(2030, 1, 1), 4)]
    fn test_ordinal_for(#[case] value: NaiveDateTime, #[case] expected: u32) {
        assert_eq!(set().ordinal_for(value), expected);
    }

    #[test]
    fn test_boundary_belongs_to_partition_it_starts() {
        let boundary = year_start(2022).unwrap();
        assert_eq!(set().ordinal_for(boundary), 2);
        assert_eq!(set().ordinal_for(boundary - chrono::Duration::seconds(1)), 1);
    }

    #[test]
    fn test_ordinals_are_monotonic() {
        let set = set();
        let mut previous = 0;
        for year in 2020..2027 {
            for month in 1..=12 {
                let ordinal = set.ordinal_for(at(year, month, 1));
                assert!(ordinal >= previous);
                assert!((1..=set.partition_count()).contains(&ordinal));
                previous = ordinal;
            }
        }
    }

    #[test]
    fn test_ordinal_for_year_matches_ordinal_of_year_start() {
        let set = set();
        for &year in set.years() {
            assert_eq!(
                set.ordinal_for_year(year),
                Some(set.ordinal_for(year_start(year).unwrap()))
            );
        }
        assert_eq!(set.ordinal_for_year(2019), None);
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::descending(&[2024, 2023])]
    #[case::duplicate(&[2022, 2022])]
    #[case::out_of_range(&[2022, 300000])]
    fn test_invalid_sets_rejected(#[case] years: &[i32]) {
        let err = RetentionBoundarySet::from_years(years).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
