use std::sync::atomic::{AtomicU32, Ordering};

use crate::common::ByteStr;

#[derive(Clone, Default)]
pub struct Id(ByteStr);

impl Id {
    pub(crate) fn unnamed() -> Self {
        Self(ByteStr::from_static(""))
    }

    pub(crate) fn next(atomic: &AtomicU32) -> Self {
        let id = atomic.fetch_add(1, Ordering::Relaxed);
        let mut b = itoa::Buffer::new();
        let id = b.format(id);

        let mut name = String::with_capacity(1 + id.len().max(5));
        name.push('q');
        for _ in id.len()..5 {
            name.push('0');
        }
        name.push_str(id);

        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_unnamed(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Id { }

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.as_str()).finish()
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

macro_rules! delegate {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, Default)]
        pub struct $name(Id);

        impl $name {
            pub(crate) fn unnamed() -> Self {
                Self(Id::unnamed())
            }

            #[allow(unused, reason = "only the unnamed portal is used")]
            pub(crate) fn next() -> Self {
                static ID: AtomicU32 = AtomicU32::new(0);
                Self(Id::next(&ID))
            }
        }

        impl std::ops::Deref for $name {
            type Target = Id;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.as_str()).finish()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

delegate!(StatementName);
delegate!(PortalName);

impl StatementName {
    /// Name of the statement rewritten to insert `rows` rows, `{base}_{rows}`.
    ///
    /// The unnamed statement stays unnamed.
    pub(crate) fn batched(&self, rows: usize) -> StatementName {
        if self.is_unnamed() || rows <= 1 {
            return self.clone();
        }
        let mut b = itoa::Buffer::new();
        let rows = b.format(rows);
        let mut name = String::with_capacity(self.as_str().len() + 1 + rows.len());
        name.push_str(self.as_str());
        name.push('_');
        name.push_str(rows);
        Self(Id(name.into()))
    }
}
