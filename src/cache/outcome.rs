//! Lookup results.

/// Why a protected lookup produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbsentReason {
    /// The existence filter has never seen the ID
    Filtered,
    /// A tombstone is cached for the ID
    Tombstone,
    /// The record store has no such record
    NotInStore,
    /// Another caller is rebuilding the entry and the retry budget ran out
    Contended,
}

impl AbsentReason {
    /// True for the authoritative "does not exist" answers.
    ///
    /// `Contended` is a soft absence: the record may well exist.
    pub fn is_not_found(self) -> bool {
        !matches!(self, AbsentReason::Contended)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AbsentReason::Filtered => "filtered",
            AbsentReason::Tombstone => "tombstone",
            AbsentReason::NotInStore => "not_in_store",
            AbsentReason::Contended => "contended",
        }
    }
}

/// Result of [`super::CacheRebuildPolicy::lookup_with_protection`].
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Hit(T),
    Absent(AbsentReason),
}

impl<T> LookupOutcome<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, LookupOutcome::Hit(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupOutcome::Absent(reason) if reason.is_not_found())
    }

    pub fn is_contended(&self) -> bool {
        matches!(self, LookupOutcome::Absent(AbsentReason::Contended))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            LookupOutcome::Hit(value) => Some(value),
            LookupOutcome::Absent(_) => None,
        }
    }

    pub fn absent_reason(&self) -> Option<AbsentReason> {
        match self {
            LookupOutcome::Hit(_) => None,
            LookupOutcome::Absent(reason) => Some(*reason),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            LookupOutcome::Hit(value) => Some(value),
            LookupOutcome::Absent(_) => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> LookupOutcome<U> {
        match self {
            LookupOutcome::Hit(value) => LookupOutcome::Hit(f(value)),
            LookupOutcome::Absent(reason) => LookupOutcome::Absent(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let hit = LookupOutcome::Hit(5);
        assert!(hit.is_hit());
        assert_eq!(hit.value(), Some(&5));
        assert_eq!(hit.map(|v| v * 2).into_option(), Some(10));

        let filtered: LookupOutcome<u32> = LookupOutcome::Absent(AbsentReason::Filtered);
        assert!(filtered.is_not_found());
        assert!(!filtered.is_contended());

        let contended: LookupOutcome<u32> = LookupOutcome::Absent(AbsentReason::Contended);
        assert!(!contended.is_not_found());
        assert!(contended.is_contended());
        assert_eq!(contended.absent_reason(), Some(AbsentReason::Contended));
    }
}
