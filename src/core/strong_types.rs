// Strong Types - Newtype identifiers for comments, posts and users
// Keeps a comment id from ever being passed where a post id is expected

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Raw value, as bound into SQL
            pub fn value(self) -> i64 {
                self.0
            }

            pub fn is_valid(self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Comment identifier, assigned by the comment store on insert
    CommentId
);

define_id!(
    /// Identifier of the post a thread hangs off; owned by the post service
    PostId
);

define_id!(
    /// Identifier of a user; owned by the identity service
    UserId
);
