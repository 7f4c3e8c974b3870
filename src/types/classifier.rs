//! Constraint and variable classifiers.
//!
//! A classifier partitions either the constraints or the variables of a
//! problem into named classes. Detectors use classes to decide which items
//! belong in the master; candidates record which classes were used in their
//! lineage.
//!
//! Constraint and variable classifiers share one representation and are
//! told apart by an explicit [`ClassifierKind`] tag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which dimension a classifier partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifierKind {
    /// Classes of constraints.
    Constraint,
    /// Classes of variables.
    Variable,
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constraint => write!(f, "constraint"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

/// Error building a classifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    /// An item refers to a class that does not exist.
    #[error("Item {item} assigned to unknown class {class} (only {n_classes} classes)")]
    UnknownClass {
        /// Offending item index.
        item: usize,
        /// Class it was assigned to.
        class: usize,
        /// Number of declared classes.
        n_classes: usize,
    },
}

/// A named partition of constraint or variable indices into classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    kind: ClassifierKind,
    name: String,
    class_names: Vec<String>,
    /// Class of each item, indexed by constraint or variable index.
    class_of: Vec<usize>,
}

impl Classifier {
    /// Create a classifier, validating that every item refers to a declared class.
    pub fn new(
        kind: ClassifierKind,
        name: impl Into<String>,
        class_names: Vec<String>,
        class_of: Vec<usize>,
    ) -> Result<Self, ClassifierError> {
        if let Some((item, &class)) = class_of
            .iter()
            .enumerate()
            .find(|(_, &c)| c >= class_names.len())
        {
            return Err(ClassifierError::UnknownClass {
                item,
                class,
                n_classes: class_names.len(),
            });
        }

        Ok(Self {
            kind,
            name: name.into(),
            class_names,
            class_of,
        })
    }

    /// Shorthand for a constraint classifier.
    pub fn constraints(
        name: impl Into<String>,
        class_names: Vec<String>,
        class_of: Vec<usize>,
    ) -> Result<Self, ClassifierError> {
        Self::new(ClassifierKind::Constraint, name, class_names, class_of)
    }

    /// Shorthand for a variable classifier.
    pub fn variables(
        name: impl Into<String>,
        class_names: Vec<String>,
        class_of: Vec<usize>,
    ) -> Result<Self, ClassifierError> {
        Self::new(ClassifierKind::Variable, name, class_names, class_of)
    }

    /// Dimension this classifier partitions.
    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    /// Classifier name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Name of a class.
    pub fn class_name(&self, class: usize) -> Option<&str> {
        self.class_names.get(class).map(String::as_str)
    }

    /// Number of classified items.
    pub fn n_items(&self) -> usize {
        self.class_of.len()
    }

    /// Class of an item.
    pub fn class_of(&self, item: usize) -> Option<usize> {
        self.class_of.get(item).copied()
    }

    /// Items of a class, in increasing order.
    pub fn members(&self, class: usize) -> Vec<usize> {
        self.class_of
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == class)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Statistics recorded when a classifier drove a refinement step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassifierStats {
    /// Constraint classes sent to the master.
    Constraint {
        /// Classifier name.
        classifier: String,
        /// Names of classes whose constraints went to the master.
        classes_to_master: Vec<String>,
    },
    /// Variable classes sent to the border.
    Variable {
        /// Classifier name.
        classifier: String,
        /// Names of classes whose variables went to the master.
        classes_to_master: Vec<String>,
        /// Names of classes whose variables became linking.
        classes_to_linking: Vec<String>,
    },
}

impl ClassifierStats {
    /// Build statistics for the given classifier and class selection.
    pub fn record(classifier: &Classifier, to_master: &[usize], to_linking: &[usize]) -> Self {
        let names = |classes: &[usize]| -> Vec<String> {
            classes
                .iter()
                .filter_map(|&c| classifier.class_name(c))
                .map(str::to_string)
                .collect()
        };

        match classifier.kind() {
            ClassifierKind::Constraint => Self::Constraint {
                classifier: classifier.name().to_string(),
                classes_to_master: names(to_master),
            },
            ClassifierKind::Variable => Self::Variable {
                classifier: classifier.name().to_string(),
                classes_to_master: names(to_master),
                classes_to_linking: names(to_linking),
            },
        }
    }

    /// Kind tag of the classifier these statistics came from.
    pub fn kind(&self) -> ClassifierKind {
        match self {
            Self::Constraint { .. } => ClassifierKind::Constraint,
            Self::Variable { .. } => ClassifierKind::Variable,
        }
    }
}
