use serde::{Deserialize, Serialize};

/// Ownership and sharing fields common to persisted entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedFields {
    pub owner_href: Option<String>,
    pub creator_href: Option<String>,
    pub access: Option<String>,
    pub public: bool,
    /// Containing collection for entities stored inside one.
    pub col_path: Option<String>,
}

/// Entities carrying [`OwnedFields`].
pub trait Owned {
    fn owned(&self) -> &OwnedFields;
    fn owned_mut(&mut self) -> &mut OwnedFields;
}

macro_rules! impl_owned {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::owned::Owned for $ty {
                fn owned(&self) -> &$crate::owned::OwnedFields {
                    &self.owned
                }

                fn owned_mut(&mut self) -> &mut $crate::owned::OwnedFields {
                    &mut self.owned
                }
            }
        )+
    };
}

pub(crate) use impl_owned;
