//! Hash helpers over one or more concatenated byte slices.

#[doc(hidden)]
pub use sha1::Sha1 as __Sha1;
#[doc(hidden)]
pub use sha2::Digest as __Digest;
#[doc(hidden)]
pub use sha2::Sha256 as __Sha256;

/// SHA-1 of the concatenation of every argument, as `[u8; 20]`.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::sha::__Digest as _;
        let mut h = $crate::sha::__Sha1::new();
        $( h.update($x); )+
        let out: [u8; 20] = h.finalize().into();
        out
    }};
}

/// SHA-256 of the concatenation of every argument, as `[u8; 32]`.
#[macro_export]
macro_rules! sha256 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::sha::__Digest as _;
        let mut h = $crate::sha::__Sha256::new();
        $( h.update($x); )+
        let out: [u8; 32] = h.finalize().into();
        out
    }};
}
