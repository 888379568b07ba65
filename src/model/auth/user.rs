use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::{admin::Admin, id::Id, voter::Voter};
use crate::store::DbPath;

/// A user of our application, having defined rights.
pub trait User {
    /// The rights of this user type.
    const RIGHTS: Rights;

    /// Get the user's ID.
    fn id(&self) -> &Id;

    /// Where a user of this type with the given ID is stored.
    fn path(id: &Id) -> DbPath;
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;

    fn id(&self) -> &Id {
        &self.id
    }

    fn path(id: &Id) -> DbPath {
        Voter::path(id)
    }
}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;

    fn id(&self) -> &Id {
        &self.id
    }

    fn path(id: &Id) -> DbPath {
        Admin::path(id)
    }
}
