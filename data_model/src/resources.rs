use std::fmt::{self, Display};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CPUS: &str = "cpus";
pub const MEM: &str = "mem";
pub const DISK: &str = "disk";
pub const PORTS: &str = "ports";

pub const DEFAULT_ROLE: &str = "*";

// Scalar remainders at or below this are treated as fully consumed.
const SCALAR_EPSILON: f64 = 1e-6;

pub fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// Inclusive range of values, e.g. host ports `31000-31005`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ValueRange {
    pub begin: u64,
    pub end: u64,
}

impl ValueRange {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, other: &ValueRange) -> bool {
        other.begin >= self.begin && other.end <= self.end
    }

    fn minus(&self, taken: &ValueRange) -> Vec<ValueRange> {
        if taken.end < self.begin || taken.begin > self.end {
            return vec![*self];
        }
        let mut remaining = Vec::with_capacity(2);
        if taken.begin > self.begin {
            remaining.push(ValueRange::new(self.begin, taken.begin - 1));
        }
        if taken.end < self.end {
            remaining.push(ValueRange::new(taken.end + 1, self.end));
        }
        remaining
    }
}

impl Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.begin, self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    Scalar(f64),
    Ranges(Vec<ValueRange>),
    Set(Vec<String>),
}

impl ResourceValue {
    /// Removes `consumed` from this value. Returns `None` once nothing is left.
    fn subtract(&self, consumed: &ResourceValue) -> Option<ResourceValue> {
        let remaining = match (self, consumed) {
            (ResourceValue::Scalar(offered), ResourceValue::Scalar(taken)) => {
                ResourceValue::Scalar(offered - taken)
            }
            (ResourceValue::Ranges(offered), ResourceValue::Ranges(taken)) => {
                ResourceValue::Ranges(subtract_ranges(offered, taken))
            }
            (ResourceValue::Set(offered), ResourceValue::Set(taken)) => ResourceValue::Set(
                offered
                    .iter()
                    .filter(|item| !taken.contains(*item))
                    .cloned()
                    .collect(),
            ),
            (offered, taken) => {
                debug!(
                    offered = %offered,
                    consumed = %taken,
                    "resource type mismatch, leaving resource untouched"
                );
                offered.clone()
            }
        };
        (!remaining.is_empty()).then_some(remaining)
    }

    fn covers(&self, required: &ResourceValue) -> bool {
        match (self, required) {
            (ResourceValue::Scalar(offered), ResourceValue::Scalar(needed)) => {
                offered + SCALAR_EPSILON >= *needed
            }
            (ResourceValue::Ranges(offered), ResourceValue::Ranges(needed)) => needed
                .iter()
                .all(|range| offered.iter().any(|available| available.contains(range))),
            (ResourceValue::Set(offered), ResourceValue::Set(needed)) => {
                needed.iter().all(|item| offered.contains(item))
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ResourceValue::Scalar(value) => *value <= SCALAR_EPSILON,
            ResourceValue::Ranges(ranges) => ranges.is_empty(),
            ResourceValue::Set(items) => items.is_empty(),
        }
    }
}

impl Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceValue::Scalar(value) => write!(f, "{value}"),
            ResourceValue::Ranges(ranges) => write!(f, "[{}]", ranges.iter().join(", ")),
            ResourceValue::Set(items) => write!(f, "{{{}}}", items.iter().join(", ")),
        }
    }
}

/// A named quantity advertised in an offer or consumed by a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(flatten)]
    pub value: ResourceValue,
}

impl Resource {
    pub fn scalar(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            role: default_role(),
            value: ResourceValue::Scalar(value),
        }
    }

    pub fn ranges(name: &str, ranges: Vec<ValueRange>) -> Self {
        Self {
            name: name.to_string(),
            role: default_role(),
            value: ResourceValue::Ranges(ranges),
        }
    }

    pub fn set(name: &str, items: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            role: default_role(),
            value: ResourceValue::Set(items),
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    fn same_kind(&self, other: &Resource) -> bool {
        self.name == other.name && self.role == other.role
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}):{}", self.name, self.role, self.value)
    }
}

fn subtract_ranges(offered: &[ValueRange], consumed: &[ValueRange]) -> Vec<ValueRange> {
    consumed.iter().fold(offered.to_vec(), |remaining, taken| {
        remaining
            .into_iter()
            .flat_map(|range| range.minus(taken))
            .collect()
    })
}

/// Subtracts `consumed` from `resources` dimension by dimension, matching on
/// name and role.
///
/// Scalars are drawn from same-kind entries in offer order, so an offer that
/// lists a scalar more than once loses exactly the consumed amount in total.
/// The caller guarantees that `consumed` fits into `resources`. Dimensions
/// that end up empty are dropped, so the result never carries a negative or
/// zero quantity.
pub fn deduct(resources: &[Resource], consumed: &[Resource]) -> Vec<Resource> {
    for taken in consumed {
        if !resources.iter().any(|offered| offered.same_kind(taken)) {
            debug!(
                resource = %taken,
                "consumed resource is not part of the offer, ignoring"
            );
        }
    }

    // Scalar demand still to be drawn, one entry per consumed scalar.
    let mut owed: Vec<(&Resource, f64)> = consumed
        .iter()
        .filter_map(|taken| match taken.value {
            ResourceValue::Scalar(amount) => Some((taken, amount)),
            _ => None,
        })
        .collect();

    let remaining: Vec<Resource> = resources
        .iter()
        .filter_map(|offered| {
            let value = match offered.value {
                ResourceValue::Scalar(available) => {
                    let mut left = available;
                    for (taken, amount) in owed.iter_mut() {
                        if !offered.same_kind(taken) {
                            continue;
                        }
                        let drawn = amount.min(left);
                        left -= drawn;
                        *amount -= drawn;
                    }
                    let value = ResourceValue::Scalar(left);
                    (!value.is_empty()).then_some(value)
                }
                _ => consumed
                    .iter()
                    .filter(|taken| offered.same_kind(taken))
                    .try_fold(offered.value.clone(), |value, taken| {
                        value.subtract(&taken.value)
                    }),
            };
            value.map(|value| Resource {
                name: offered.name.clone(),
                role: offered.role.clone(),
                value,
            })
        })
        .collect();

    for (taken, amount) in owed {
        if amount > SCALAR_EPSILON {
            debug!(
                resource = %taken,
                missing = amount,
                "consumed more than the offer had, remainder ignored"
            );
        }
    }
    remaining
}

/// Diagnostic rendering, e.g. `cpus(*):4; ports(*):[31000-31005]`.
pub fn render(resources: &[Resource]) -> String {
    resources.iter().join("; ")
}

/// Returns true when every required resource is available in `resources`.
///
/// Scalars are compared as totals per name and role on both sides, the same
/// way `scalar` and `deduct` see them. Ranges and sets need a single offered
/// entry that covers them.
pub fn contains(resources: &[Resource], required: &[Resource]) -> bool {
    required.iter().enumerate().all(|(index, needed)| match needed.value {
        ResourceValue::Scalar(_) => {
            let seen_before = required[..index].iter().any(|earlier| {
                earlier.same_kind(needed) && matches!(earlier.value, ResourceValue::Scalar(_))
            });
            seen_before
                || scalar(resources, &needed.name, &needed.role) + SCALAR_EPSILON
                    >= scalar(required, &needed.name, &needed.role)
        }
        _ => resources
            .iter()
            .any(|offered| offered.same_kind(needed) && offered.value.covers(&needed.value)),
    })
}

/// Sum of all scalar resources named `name` for `role`.
pub fn scalar(resources: &[Resource], name: &str, role: &str) -> f64 {
    resources
        .iter()
        .filter(|r| r.name == name && r.role == role)
        .filter_map(|r| match r.value {
            ResourceValue::Scalar(value) => Some(value),
            _ => None,
        })
        .sum()
}

/// All ranges named `name` for `role`, in offer order.
pub fn ranges(resources: &[Resource], name: &str, role: &str) -> Vec<ValueRange> {
    resources
        .iter()
        .filter(|r| r.name == name && r.role == role)
        .flat_map(|r| match &r.value {
            ResourceValue::Ranges(ranges) => ranges.clone(),
            _ => vec![],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduct() {
        struct Case {
            description: &'static str,
            offered: Vec<Resource>,
            consumed: Vec<Resource>,
            expected: Vec<Resource>,
        }
        let cases = vec![
            Case {
                description: "scalar subtraction",
                offered: vec![Resource::scalar(CPUS, 4.0), Resource::scalar(MEM, 1024.0)],
                consumed: vec![Resource::scalar(CPUS, 1.0), Resource::scalar(MEM, 256.0)],
                expected: vec![Resource::scalar(CPUS, 3.0), Resource::scalar(MEM, 768.0)],
            },
            Case {
                description: "fully consumed scalar is dropped",
                offered: vec![Resource::scalar(CPUS, 1.0), Resource::scalar(MEM, 128.0)],
                consumed: vec![Resource::scalar(CPUS, 1.0)],
                expected: vec![Resource::scalar(MEM, 128.0)],
            },
            Case {
                description: "range split around consumed port",
                offered: vec![Resource::ranges(PORTS, vec![ValueRange::new(31000, 31005)])],
                consumed: vec![Resource::ranges(PORTS, vec![ValueRange::new(31002, 31002)])],
                expected: vec![Resource::ranges(
                    PORTS,
                    vec![ValueRange::new(31000, 31001), ValueRange::new(31003, 31005)],
                )],
            },
            Case {
                description: "range trimmed at both edges",
                offered: vec![Resource::ranges(
                    PORTS,
                    vec![ValueRange::new(1, 3), ValueRange::new(10, 12)],
                )],
                consumed: vec![Resource::ranges(
                    PORTS,
                    vec![ValueRange::new(1, 1), ValueRange::new(12, 12)],
                )],
                expected: vec![Resource::ranges(
                    PORTS,
                    vec![ValueRange::new(2, 3), ValueRange::new(10, 11)],
                )],
            },
            Case {
                description: "set items removed",
                offered: vec![Resource::set(
                    "disks",
                    vec!["sda".to_string(), "sdb".to_string()],
                )],
                consumed: vec![Resource::set("disks", vec!["sda".to_string()])],
                expected: vec![Resource::set("disks", vec!["sdb".to_string()])],
            },
            Case {
                description: "different role is not touched",
                offered: vec![Resource::scalar(CPUS, 2.0).with_role("analytics")],
                consumed: vec![Resource::scalar(CPUS, 1.0)],
                expected: vec![Resource::scalar(CPUS, 2.0).with_role("analytics")],
            },
            Case {
                description: "scalar listed twice is drawn down in order",
                offered: vec![Resource::scalar(CPUS, 2.0), Resource::scalar(CPUS, 2.0)],
                consumed: vec![Resource::scalar(CPUS, 1.0)],
                expected: vec![Resource::scalar(CPUS, 1.0), Resource::scalar(CPUS, 2.0)],
            },
            Case {
                description: "consumption spills into the next entry of the same kind",
                offered: vec![
                    Resource::scalar(CPUS, 1.0),
                    Resource::scalar(MEM, 64.0),
                    Resource::scalar(CPUS, 2.0),
                ],
                consumed: vec![Resource::scalar(CPUS, 0.5), Resource::scalar(CPUS, 1.5)],
                expected: vec![Resource::scalar(MEM, 64.0), Resource::scalar(CPUS, 1.0)],
            },
            Case {
                description: "duplicate entry of another role keeps its amount",
                offered: vec![
                    Resource::scalar(CPUS, 1.0),
                    Resource::scalar(CPUS, 3.0).with_role("analytics"),
                    Resource::scalar(CPUS, 1.0),
                ],
                consumed: vec![Resource::scalar(CPUS, 1.5)],
                expected: vec![
                    Resource::scalar(CPUS, 3.0).with_role("analytics"),
                    Resource::scalar(CPUS, 0.5),
                ],
            },
            Case {
                description: "unknown consumed resource is ignored",
                offered: vec![Resource::scalar(CPUS, 2.0)],
                consumed: vec![Resource::scalar("gpus", 1.0)],
                expected: vec![Resource::scalar(CPUS, 2.0)],
            },
        ];

        for case in cases {
            assert_eq!(
                deduct(&case.offered, &case.consumed),
                case.expected,
                "{}",
                case.description
            );
        }
    }

    #[test]
    fn test_sequential_deduction_matches_combined() {
        let offered = vec![
            Resource::scalar(CPUS, 4.0),
            Resource::scalar(MEM, 2048.0),
            Resource::ranges(PORTS, vec![ValueRange::new(31000, 31010)]),
        ];
        let first = vec![
            Resource::scalar(CPUS, 1.0),
            Resource::scalar(MEM, 512.0),
            Resource::ranges(PORTS, vec![ValueRange::new(31000, 31000)]),
        ];
        let second = vec![
            Resource::scalar(CPUS, 0.5),
            Resource::scalar(MEM, 512.0),
            Resource::ranges(PORTS, vec![ValueRange::new(31001, 31001)]),
        ];

        let sequential = deduct(&deduct(&offered, &first), &second);
        let combined: Vec<Resource> = first.into_iter().chain(second).collect();
        assert_eq!(sequential, deduct(&offered, &combined));
        assert_eq!(scalar(&sequential, CPUS, DEFAULT_ROLE), 2.5);
        assert_eq!(
            ranges(&sequential, PORTS, DEFAULT_ROLE),
            vec![ValueRange::new(31002, 31010)]
        );
    }

    #[test]
    fn test_no_dimension_goes_negative() {
        let mut remaining = vec![Resource::scalar(CPUS, 1.0), Resource::scalar(MEM, 100.0)];
        for _ in 0..3 {
            remaining = deduct(&remaining, &[Resource::scalar(CPUS, 0.5)]);
            assert!(scalar(&remaining, CPUS, DEFAULT_ROLE) >= 0.0);
        }
        assert_eq!(remaining, vec![Resource::scalar(MEM, 100.0)]);
    }

    #[test]
    fn test_contains() {
        let offered = vec![
            Resource::scalar(CPUS, 2.0),
            Resource::ranges(PORTS, vec![ValueRange::new(100, 105)]),
        ];
        assert!(contains(&offered, &[Resource::scalar(CPUS, 2.0)]));
        assert!(!contains(&offered, &[Resource::scalar(CPUS, 2.5)]));
        assert!(contains(
            &offered,
            &[Resource::ranges(PORTS, vec![ValueRange::new(101, 102)])]
        ));
        assert!(!contains(
            &offered,
            &[Resource::ranges(PORTS, vec![ValueRange::new(105, 106)])]
        ));
        assert!(!contains(&offered, &[Resource::scalar(MEM, 1.0)]));
        assert!(contains(&offered, &[]));
    }

    #[test]
    fn test_contains_sums_duplicate_scalars() {
        let offered = vec![Resource::scalar(CPUS, 2.0), Resource::scalar(CPUS, 2.0)];

        assert_eq!(scalar(&offered, CPUS, DEFAULT_ROLE), 4.0);
        assert!(contains(&offered, &[Resource::scalar(CPUS, 3.0)]));
        assert!(contains(&offered, &[Resource::scalar(CPUS, 4.0)]));
        assert!(!contains(&offered, &[Resource::scalar(CPUS, 4.5)]));
        // required entries of the same kind add up too
        assert!(!contains(
            &offered,
            &[Resource::scalar(CPUS, 3.0), Resource::scalar(CPUS, 3.0)]
        ));
        assert!(!contains(
            &offered,
            &[Resource::scalar(CPUS, 1.0).with_role("analytics")]
        ));

        // whatever fits can be deducted without losing the rest
        let remaining = deduct(&offered, &[Resource::scalar(CPUS, 3.0)]);
        assert_eq!(scalar(&remaining, CPUS, DEFAULT_ROLE), 1.0);
        let remaining = deduct(&offered, &[Resource::scalar(CPUS, 1.0)]);
        assert_eq!(scalar(&remaining, CPUS, DEFAULT_ROLE), 3.0);
    }

    #[test]
    fn test_render() {
        let resources = vec![
            Resource::scalar(CPUS, 4.0),
            Resource::ranges(
                PORTS,
                vec![ValueRange::new(31000, 31001), ValueRange::new(31005, 31005)],
            ),
            Resource::set("zones", vec!["a".to_string(), "b".to_string()]),
        ];
        assert_eq!(
            render(&resources),
            "cpus(*):4; ports(*):[31000-31001, 31005-31005]; zones(*):{a, b}"
        );
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_resource_yaml_shape() {
        let yaml = r#"
- name: cpus
  scalar: 2.5
- name: ports
  role: web
  ranges:
    - begin: 31000
      end: 31002
"#;
        let resources: Vec<Resource> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            resources,
            vec![
                Resource::scalar(CPUS, 2.5),
                Resource::ranges(PORTS, vec![ValueRange::new(31000, 31002)]).with_role("web"),
            ]
        );
    }
}
