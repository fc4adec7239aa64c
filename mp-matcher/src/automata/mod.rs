//! The automata layer: a shared NFA arena, the lazily subset-constructed
//! DFA over it, and the storage that owns both.
//!
//! Everything here is index-based. States live in arenas owned by
//! [`storage::NodeStorage`] and refer to each other through the id newtypes
//! below, which keeps the cyclic ε-graphs of `*`/`+` out of the ownership
//! story entirely and makes basis equality an integer-slice comparison.

pub(crate) mod dfa;
pub(crate) mod nfa;
pub(crate) mod storage;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub(crate) struct $name(pub(crate) u32);

        impl $name {
            #[inline]
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(
    /// Identifies an NFA state within its owning [`storage::NodeStorage`].
    NfaId
);
id_type!(
    /// Identifies an interned DFA state within its owning
    /// [`storage::NodeStorage`].
    DfaId
);
id_type!(
    /// Identifies a registered pattern within one engine (one shard).
    PatternId
);
