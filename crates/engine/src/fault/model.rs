//! Fault records and equivalence bookkeeping.
//!
//! Faults live in an owning arena ([`FaultList`]) and refer to each other by
//! index ([`FaultId`]). The equivalence relation is a forest of depth one:
//! a non-prime fault points directly at its prime, primes point at nothing,
//! and the pointers are never mutated after parsing.

use std::collections::BTreeMap;
use std::fmt;

use crate::common::error::{Error, Result};

/// Index of a fault within its [`FaultList`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FaultId(pub usize);

/// One fault extracted from the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Two-letter fault status code (equivalents inherit their prime's).
    pub fault_status: String,
    /// Fault type: `0`, `1`, `R`, `F` or `~`.
    pub fault_type: String,
    /// Timing annotations, when present (e.g. `["7.52ns"]`).
    pub timing_info: Vec<String>,
    /// Quote-stripped hierarchical fault sites.
    pub fault_sites: Vec<String>,
    /// Arbitrary per-fault attributes (names and values as strings).
    pub fault_attributes: BTreeMap<String, String>,
    /// For a prime: itself plus its equivalent siblings. Always ≥ 1.
    pub equivalent_faults: usize,
    /// The prime this fault collapsed into; `None` ⇔ this fault is prime.
    pub equivalent_to: Option<FaultId>,
}

impl Fault {
    /// Creates a prime fault with the given status and type.
    pub fn new(fault_status: impl Into<String>, fault_type: impl Into<String>) -> Self {
        Self {
            fault_status: fault_status.into(),
            fault_type: fault_type.into(),
            timing_info: Vec::new(),
            fault_sites: Vec::new(),
            fault_attributes: BTreeMap::new(),
            equivalent_faults: 1,
            equivalent_to: None,
        }
    }

    /// Whether this fault is prime (not collapsed into another).
    pub fn is_prime(&self) -> bool {
        self.equivalent_to.is_none()
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.fault_attributes.get(name).map(String::as_str)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.fault_status,
            self.fault_type,
            self.fault_sites.join(" + ")
        )
    }
}

/// Owning arena of all faults of one report, in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultList {
    faults: Vec<Fault>,
}

impl FaultList {
    /// Creates an empty fault list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of faults (primes and equivalents).
    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// Whether the list holds no faults.
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// The fault with the given id.
    pub fn get(&self, id: FaultId) -> Option<&Fault> {
        self.faults.get(id.0)
    }

    /// Iterates over all faults in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter()
    }

    /// Iterates over the prime faults only.
    pub fn primes(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter().filter(|fault| fault.is_prime())
    }

    /// Appends a fault, returning its id.
    pub(crate) fn push(&mut self, fault: Fault) -> FaultId {
        self.faults.push(fault);
        FaultId(self.faults.len() - 1)
    }

    /// Mutable access for the parser's equivalence bookkeeping.
    pub(crate) fn get_mut(&mut self, id: FaultId) -> Option<&mut Fault> {
        self.faults.get_mut(id.0)
    }

    /// Checks the depth-1 equivalence forest invariant.
    ///
    /// Every non-prime must point at a prime, and every prime's
    /// `equivalent_faults` must equal one plus its number of children.
    ///
    /// # Errors
    ///
    /// [`Error::Invariant`] describing the violation. Unreachable after a
    /// successful parse.
    pub fn verify_equivalences(&self) -> Result<()> {
        for (index, fault) in self.faults.iter().enumerate() {
            if let Some(prime_id) = fault.equivalent_to {
                let prime = self.get(prime_id).ok_or_else(|| {
                    Error::Invariant(format!("fault {index} points at missing fault {prime_id:?}"))
                })?;
                if !prime.is_prime() {
                    return Err(Error::Invariant(format!(
                        "fault {index} is equivalent to non-prime fault {prime_id:?}"
                    )));
                }
            }
        }

        for (index, fault) in self.faults.iter().enumerate() {
            if fault.is_prime() {
                let children = self
                    .faults
                    .iter()
                    .filter(|other| other.equivalent_to == Some(FaultId(index)))
                    .count();
                if fault.equivalent_faults != 1 + children {
                    return Err(Error::Invariant(format!(
                        "prime fault {index} claims {} equivalents but has {children} children",
                        fault.equivalent_faults
                    )));
                }
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a FaultList {
    type Item = &'a Fault;
    type IntoIter = std::slice::Iter<'a, Fault>;

    fn into_iter(self) -> Self::IntoIter {
        self.faults.iter()
    }
}
