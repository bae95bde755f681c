mod constraint;
mod contact_constraint;
mod joint;
mod row;

pub use constraint::{Constraint, ConstraintHandle, ConstraintKind, DEFAULT_ERP};
pub use contact_constraint::update_contact_constraints;
pub use joint::{JointDesc, PointConstraint, WeldConstraint};
pub use row::ConstraintRow;
