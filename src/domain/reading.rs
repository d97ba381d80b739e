//! Reading history
//!
//! A book's reading state is never stored; it is derived from the `reads`
//! list, and only the last interval counts. Books written before the list
//! existed carry a single `startedAt`/`finishedAt` pair (and sometimes a
//! `status` string) which `migrate_reads` folds into the list.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DomainError;
use crate::models::book::{Book, ReadInterval};

/// Derived reading status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Reading,
    Finished,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Reading => "reading",
            ReadingStatus::Finished => "finished",
        }
    }
}

/// Fold legacy date fields into `reads`. Idempotent.
pub fn migrate_reads(mut book: Book) -> Book {
    if book.reads.is_some() {
        return book;
    }
    book.reads = Some(legacy_reads(&book));
    book.started_at = None;
    book.finished_at = None;
    book.status = None;
    book
}

fn legacy_reads(book: &Book) -> Vec<ReadInterval> {
    match (book.started_at, book.finished_at) {
        (None, None) => Vec::new(),
        (started_at, finished_at) => vec![ReadInterval {
            started_at,
            finished_at,
        }],
    }
}

/// The read list as it would look after migration, without cloning the book
pub fn effective_reads(book: &Book) -> Cow<'_, [ReadInterval]> {
    match &book.reads {
        Some(reads) => Cow::Borrowed(reads.as_slice()),
        None => Cow::Owned(legacy_reads(book)),
    }
}

/// Last interval of the history, if any
pub fn current_read(book: &Book) -> Option<ReadInterval> {
    effective_reads(book).last().copied()
}

pub fn book_status(book: &Book) -> Option<ReadingStatus> {
    current_read(book).map(|read| match read.finished_at {
        None => ReadingStatus::Reading,
        Some(_) => ReadingStatus::Finished,
    })
}

/// Number of completed intervals
pub fn times_read(book: &Book) -> usize {
    effective_reads(book)
        .iter()
        .filter(|read| read.finished_at.is_some())
        .count()
}

/// Append a fresh interval starting at `now`
pub fn start_reread(
    reads: &[ReadInterval],
    now: DateTime<Utc>,
) -> Result<Vec<ReadInterval>, DomainError> {
    if let Some(current) = reads.last()
        && current.finished_at.is_none()
    {
        return Err(DomainError::InvalidState(
            "Finish the current read before starting a new one".to_string(),
        ));
    }

    let mut next = reads.to_vec();
    next.push(ReadInterval {
        started_at: Some(now),
        finished_at: None,
    });
    Ok(next)
}

/// Replace the dates of the last interval; earlier intervals are untouched.
///
/// With an empty history a start date opens the first interval.
pub fn set_current_dates(
    reads: &[ReadInterval],
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Result<Vec<ReadInterval>, DomainError> {
    validate_interval(started_at, finished_at)?;

    let mut next = reads.to_vec();
    match next.last_mut() {
        Some(current) => {
            current.started_at = started_at;
            current.finished_at = finished_at;
        }
        None if started_at.is_some() => next.push(ReadInterval {
            started_at,
            finished_at,
        }),
        None => {}
    }
    Ok(next)
}

/// Close the current interval at `now`
pub fn finish_current(
    reads: &[ReadInterval],
    now: DateTime<Utc>,
) -> Result<Vec<ReadInterval>, DomainError> {
    match reads.last() {
        Some(current) if current.finished_at.is_none() => {
            set_current_dates(reads, current.started_at, Some(now))
        }
        Some(_) => Err(DomainError::InvalidState(
            "This book is not currently being read".to_string(),
        )),
        None => Err(DomainError::InvalidState(
            "This book has no reading history".to_string(),
        )),
    }
}

/// Check every interval of a history supplied as a whole (new books, imports)
pub fn validate_history(reads: &[ReadInterval]) -> Result<(), DomainError> {
    reads
        .iter()
        .try_for_each(|read| validate_interval(read.started_at, read.finished_at))
}

fn validate_interval(
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Result<(), DomainError> {
    match (started_at, finished_at) {
        (None, Some(_)) => Err(DomainError::field(
            "finishedAt",
            "A finish date needs a start date",
        )),
        (Some(start), Some(finish)) if finish < start => Err(DomainError::field(
            "finishedAt",
            "The finish date cannot be before the start date",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn interval(start: Option<u32>, finish: Option<u32>) -> ReadInterval {
        ReadInterval {
            started_at: start.map(day),
            finished_at: finish.map(day),
        }
    }

    fn legacy(start: Option<u32>, finish: Option<u32>) -> Book {
        Book {
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            started_at: start.map(day),
            finished_at: finish.map(day),
            status: Some("read".into()),
            ..Default::default()
        }
    }

    #[test]
    fn migrates_legacy_pair_into_single_interval() {
        let migrated = migrate_reads(legacy(Some(1), Some(5)));
        assert_eq!(migrated.reads, Some(vec![interval(Some(1), Some(5))]));
        assert!(migrated.started_at.is_none());
        assert!(migrated.finished_at.is_none());
        assert!(migrated.status.is_none());
    }

    #[test]
    fn migrates_start_only_into_open_interval() {
        let migrated = migrate_reads(legacy(Some(2), None));
        assert_eq!(migrated.reads, Some(vec![interval(Some(2), None)]));
        assert_eq!(book_status(&migrated), Some(ReadingStatus::Reading));
    }

    #[test]
    fn migrates_missing_dates_into_empty_history() {
        let migrated = migrate_reads(legacy(None, None));
        assert_eq!(migrated.reads, Some(vec![]));
        assert_eq!(book_status(&migrated), None);
    }

    #[test]
    fn migration_is_idempotent() {
        for book in [legacy(Some(1), Some(4)), legacy(Some(1), None), legacy(None, None)] {
            let once = migrate_reads(book);
            let twice = migrate_reads(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn existing_reads_win_over_legacy_fields() {
        let mut book = legacy(Some(1), None);
        book.reads = Some(vec![interval(Some(3), Some(4))]);
        let migrated = migrate_reads(book.clone());
        assert_eq!(migrated, book);
    }

    #[test]
    fn status_only_looks_at_last_interval() {
        // An open earlier interval does not make the book "reading"
        let book = Book {
            reads: Some(vec![interval(Some(20), None), interval(Some(1), Some(2))]),
            ..Default::default()
        };
        assert_eq!(book_status(&book), Some(ReadingStatus::Finished));

        let book = Book {
            reads: Some(vec![interval(Some(1), Some(2)), interval(Some(3), None)]),
            ..Default::default()
        };
        assert_eq!(book_status(&book), Some(ReadingStatus::Reading));
        assert_eq!(times_read(&book), 1);
    }

    #[test]
    fn status_of_unmigrated_book_matches_migrated() {
        let book = legacy(Some(1), Some(3));
        assert_eq!(book_status(&book), book_status(&migrate_reads(book.clone())));
    }

    #[test]
    fn reread_requires_finished_current_read() {
        let open = vec![interval(Some(1), None)];
        assert!(matches!(
            start_reread(&open, day(9)),
            Err(DomainError::InvalidState(_))
        ));

        let done = vec![interval(Some(1), Some(5))];
        let next = start_reread(&done, day(9)).unwrap();
        assert_eq!(next, vec![interval(Some(1), Some(5)), interval(Some(9), None)]);

        assert_eq!(start_reread(&[], day(9)).unwrap(), vec![interval(Some(9), None)]);
    }

    #[test]
    fn editing_dates_only_touches_last_interval() {
        let reads = vec![interval(Some(1), Some(2)), interval(Some(5), None)];
        let next = set_current_dates(&reads, Some(day(6)), Some(day(8))).unwrap();
        assert_eq!(next[0], interval(Some(1), Some(2)));
        assert_eq!(next[1], interval(Some(6), Some(8)));
    }

    #[test]
    fn finish_without_start_is_rejected() {
        let err = set_current_dates(&[], None, Some(day(3))).unwrap_err();
        match err {
            DomainError::Validation(fields) => assert!(fields.contains_key("finishedAt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn finish_before_start_is_rejected() {
        let reads = vec![interval(Some(5), None)];
        assert!(set_current_dates(&reads, Some(day(5)), Some(day(4))).is_err());
        assert!(finish_current(&[interval(Some(10), None)], day(4)).is_err());
    }

    #[test]
    fn finish_closes_open_interval() {
        let next = finish_current(&[interval(Some(1), None)], day(7)).unwrap();
        assert_eq!(next, vec![interval(Some(1), Some(7))]);
        assert!(finish_current(&next, day(8)).is_err());
    }

    #[test]
    fn clearing_dates_on_empty_history_is_a_no_op() {
        assert!(set_current_dates(&[], None, None).unwrap().is_empty());
    }
}
