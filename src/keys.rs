//! Cache key derivation.
//!
//! Turns a computation's identity plus its canonicalized arguments into a
//! human-readable, deterministic, backend-safe key string of the form
//! `[cached]<identity>(<args><kwargs>)`.
//!
//! Canonicalization works on an explicit value tree ([`Arg`]) rather than on
//! language reflection: call sites convert their arguments through the
//! [`ToArg`]/[`ToArgs`] traits, and a custom type participates in keys by
//! implementing [`ToArg`] with an explicit attribute allow-list. Two
//! structurally equal instances therefore collide intentionally, and nothing
//! in a key ever depends on memory addresses or hash-map iteration order.

use crate::error::CacheError;
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap};

/// Maximum key length in bytes accepted by the backend, applied after
/// sanitization.
pub const MAX_KEY_LENGTH: usize = 250;

/// Hex digest length plus the `-` separator appended when a key is truncated.
const HASH_SUFFIX_LENGTH: usize = 33;

/// How a bound computation receives its arguments, fixed at binding time.
///
/// `Method` and `Associated` declare that the leading positional argument is
/// an implicit receiver (the `self`/`Self` counterpart) and must be excluded
/// from key derivation: receivers never participate in the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CallKind {
    /// A free function; every positional argument participates in the key.
    #[default]
    Plain,
    /// A bound method; the first positional argument is the receiver.
    Method,
    /// An associated function taking its type as leading argument.
    Associated,
}

/// Canonical value tree an argument is rendered from.
///
/// # Examples
///
/// ```
/// use mintcache::Arg;
///
/// let arg = Arg::Seq {
///     type_name: "Vec",
///     items: vec![Arg::Int(1), Arg::Int(2)],
/// };
/// assert_eq!(arg.canonical().unwrap(), "Vec(1, 2)");
/// ```
///
/// Mappings render with keys sorted, removing iteration-order
/// nondeterminism:
///
/// ```
/// use mintcache::Arg;
///
/// let arg = Arg::Map(vec![
///     ("b".to_string(), Arg::Int(2)),
///     ("a".to_string(), Arg::Int(1)),
/// ]);
/// assert_eq!(arg.canonical().unwrap(), "{a: 1, b: 2}");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    /// An ordered sequence, rendered as `Type(elem, elem, ...)`.
    Seq {
        type_name: &'static str,
        items: Vec<Arg>,
    },
    /// A mapping, rendered as `{key: value, ...}` with keys sorted.
    Map(Vec<(String, Arg)>),
    /// An opaque object rendered through its attribute allow-list as
    /// `Type{attr: value, ...}` with attributes sorted. An empty allow-list
    /// renders as `Type{}`: structurally distinct instances collide
    /// intentionally instead of keying on identity.
    Object {
        type_name: String,
        attrs: Vec<(String, String)>,
    },
    /// A value with no canonical form. Rendering fails with
    /// [`CacheError::UnserializableArgument`] instead of silently producing a
    /// degenerate key.
    Opaque { type_name: String },
}

impl Arg {
    /// Shorthand for [`Arg::Opaque`].
    pub fn opaque(type_name: impl Into<String>) -> Self {
        Arg::Opaque {
            type_name: type_name.into(),
        }
    }

    /// Renders this value into its canonical string form.
    pub fn canonical(&self) -> Result<String, CacheError> {
        let mut out = String::new();
        self.render(&mut out)?;
        Ok(out)
    }

    fn render(&self, out: &mut String) -> Result<(), CacheError> {
        match self {
            Arg::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Arg::Int(i) => out.push_str(&i.to_string()),
            Arg::Uint(u) => out.push_str(&u.to_string()),
            Arg::Float(f) => out.push_str(&f.to_string()),
            Arg::Str(s) => out.push_str(s),
            Arg::Seq { type_name, items } => {
                out.push_str(type_name);
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render(out)?;
                }
                out.push(')');
            }
            Arg::Map(pairs) => {
                let mut sorted: Vec<&(String, Arg)> = pairs.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                out.push('{');
                for (i, (key, value)) in sorted.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(": ");
                    value.render(out)?;
                }
                out.push('}');
            }
            Arg::Object { type_name, attrs } => {
                let mut sorted: Vec<&(String, String)> = attrs.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                out.push_str(type_name);
                out.push('{');
                for (i, (attr, value)) in sorted.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(attr);
                    out.push_str(": ");
                    out.push_str(value);
                }
                out.push('}');
            }
            Arg::Opaque { type_name } => {
                return Err(CacheError::UnserializableArgument {
                    type_name: type_name.clone(),
                })
            }
        }
        Ok(())
    }
}

/// Conversion of a single argument into its canonical value tree.
///
/// Implementing this trait for a custom type *is* the per-type attribute
/// allow-list: only the attributes the impl lists participate in the key.
///
/// # Examples
///
/// ```
/// use mintcache::{Arg, ToArg};
///
/// struct User {
///     id: u64,
///     // session is deliberately absent from the key
///     #[allow(dead_code)]
///     session: String,
/// }
///
/// impl ToArg for User {
///     fn to_arg(&self) -> Arg {
///         Arg::Object {
///             type_name: "User".to_string(),
///             attrs: vec![("id".to_string(), self.id.to_string())],
///         }
///     }
/// }
///
/// let user = User { id: 7, session: "abc".to_string() };
/// assert_eq!(user.to_arg().canonical().unwrap(), "User{id: 7}");
/// ```
pub trait ToArg {
    fn to_arg(&self) -> Arg;
}

macro_rules! impl_to_arg_signed {
    ($($t:ty),+) => {
        $(impl ToArg for $t {
            fn to_arg(&self) -> Arg {
                Arg::Int(*self as i64)
            }
        })+
    };
}

macro_rules! impl_to_arg_unsigned {
    ($($t:ty),+) => {
        $(impl ToArg for $t {
            fn to_arg(&self) -> Arg {
                Arg::Uint(*self as u64)
            }
        })+
    };
}

impl_to_arg_signed!(i8, i16, i32, i64, isize);
impl_to_arg_unsigned!(u8, u16, u32, u64, usize);

impl ToArg for f32 {
    fn to_arg(&self) -> Arg {
        Arg::Float(f64::from(*self))
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Arg {
        Arg::Float(*self)
    }
}

impl ToArg for bool {
    fn to_arg(&self) -> Arg {
        Arg::Bool(*self)
    }
}

impl ToArg for char {
    fn to_arg(&self) -> Arg {
        Arg::Str(self.to_string())
    }
}

impl ToArg for str {
    fn to_arg(&self) -> Arg {
        Arg::Str(self.to_string())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Arg {
        Arg::Str(self.clone())
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Arg {
        (**self).to_arg()
    }
}

/// An already-canonicalized value passes through unchanged, so hand-built
/// trees mix freely with converted arguments.
impl ToArg for Arg {
    fn to_arg(&self) -> Arg {
        self.clone()
    }
}

impl<T: ToArg> ToArg for Option<T> {
    fn to_arg(&self) -> Arg {
        match self {
            Some(value) => Arg::Seq {
                type_name: "Some",
                items: vec![value.to_arg()],
            },
            None => Arg::Str("None".to_string()),
        }
    }
}

impl<T: ToArg> ToArg for Vec<T> {
    fn to_arg(&self) -> Arg {
        self.as_slice().to_arg()
    }
}

impl<T: ToArg> ToArg for [T] {
    fn to_arg(&self) -> Arg {
        Arg::Seq {
            type_name: "Vec",
            items: self.iter().map(ToArg::to_arg).collect(),
        }
    }
}

impl<V: ToArg> ToArg for HashMap<String, V> {
    fn to_arg(&self) -> Arg {
        Arg::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_arg()))
                .collect(),
        )
    }
}

impl<V: ToArg> ToArg for BTreeMap<String, V> {
    fn to_arg(&self) -> Arg {
        Arg::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_arg()))
                .collect(),
        )
    }
}

macro_rules! impl_to_arg_for_tuple {
    ($($t:ident => $idx:tt),+) => {
        impl<$($t: ToArg),+> ToArg for ($($t,)+) {
            fn to_arg(&self) -> Arg {
                Arg::Seq {
                    type_name: "tuple",
                    items: vec![$(self.$idx.to_arg()),+],
                }
            }
        }
    };
}

impl_to_arg_for_tuple!(T0 => 0, T1 => 1);
impl_to_arg_for_tuple!(T0 => 0, T1 => 1, T2 => 2);
impl_to_arg_for_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3);

/// A full argument pack: positional arguments plus named arguments.
///
/// Named arguments are the keyword-argument counterpart; they render sorted
/// by name so the calling convention never leaks into the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Arg>,
    pub named: Vec<(String, Arg)>,
}

impl CallArgs {
    /// An empty argument pack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn positional(mut self, arg: impl ToArg) -> Self {
        self.positional.push(arg.to_arg());
        self
    }

    /// Appends a named argument.
    pub fn named(mut self, name: impl Into<String>, arg: impl ToArg) -> Self {
        self.named.push((name.into(), arg.to_arg()));
        self
    }
}

/// Conversion of a call's whole argument list into a [`CallArgs`] pack.
///
/// Tuples of [`ToArg`] values supply positional arguments; a custom argument
/// struct can implement this trait directly to supply named arguments as
/// well.
pub trait ToArgs {
    fn to_args(&self) -> CallArgs;
}

impl ToArgs for () {
    fn to_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

impl ToArgs for CallArgs {
    fn to_args(&self) -> CallArgs {
        self.clone()
    }
}

macro_rules! impl_to_args_for_tuple {
    ($($t:ident => $idx:tt),+) => {
        impl<$($t: ToArg),+> ToArgs for ($($t,)+) {
            fn to_args(&self) -> CallArgs {
                CallArgs {
                    positional: vec![$(self.$idx.to_arg()),+],
                    named: Vec::new(),
                }
            }
        }
    };
}

impl_to_args_for_tuple!(T0 => 0);
impl_to_args_for_tuple!(T0 => 0, T1 => 1);
impl_to_args_for_tuple!(T0 => 0, T1 => 1, T2 => 2);
impl_to_args_for_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3);
impl_to_args_for_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4);
impl_to_args_for_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5);

/// Derives the readable cache key for one call.
///
/// The output is `[cached]<identity>(<args><kwargs>)` where `<args>` is
/// `(a, b, ...)` when any positional argument survives receiver stripping and
/// `<kwargs>` is `{name: value, ...}` sorted by name when named arguments are
/// present. The result still has to pass through [`sanitize_key`] before it
/// reaches a backend.
///
/// # Examples
///
/// ```
/// use mintcache::{derive_key, CallArgs, CallKind};
///
/// let args = CallArgs::new().positional(2).named("foo", "hello");
/// let key = derive_key("app.bar", CallKind::Plain, &args).unwrap();
/// assert_eq!(key, "[cached]app.bar((2){foo: hello})");
///
/// let empty = derive_key("app.foo", CallKind::Plain, &CallArgs::new()).unwrap();
/// assert_eq!(empty, "[cached]app.foo()");
/// ```
pub fn derive_key(
    identity: &str,
    kind: CallKind,
    args: &CallArgs,
) -> Result<String, CacheError> {
    let positional: &[Arg] = match kind {
        CallKind::Plain => &args.positional,
        CallKind::Method | CallKind::Associated => args.positional.get(1..).unwrap_or(&[]),
    };

    let mut key = String::from("[cached]");
    key.push_str(identity);
    key.push('(');
    if !positional.is_empty() {
        key.push('(');
        for (i, arg) in positional.iter().enumerate() {
            if i > 0 {
                key.push_str(", ");
            }
            arg.render(&mut key)?;
        }
        key.push(')');
    }
    if !args.named.is_empty() {
        let mut sorted: Vec<&(String, Arg)> = args.named.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        key.push('{');
        for (i, (name, arg)) in sorted.iter().enumerate() {
            if i > 0 {
                key.push_str(", ");
            }
            key.push_str(name);
            key.push_str(": ");
            arg.render(&mut key)?;
        }
        key.push('}');
    }
    key.push(')');
    Ok(key)
}

/// Hashed-mode key derivation: the md5 digest of the canonical form instead
/// of the verbose form.
///
/// Used when argument values are large or should not appear verbatim in
/// backend keys.
pub fn hashed_key(
    identity: &str,
    kind: CallKind,
    args: &CallArgs,
) -> Result<String, CacheError> {
    let canonical = derive_key(identity, kind, args)?;
    Ok(hex::encode(Md5::digest(canonical.as_bytes())))
}

fn is_control_char(c: char) -> bool {
    let code = c as u32;
    code <= 32 || code == 127
}

/// Makes a key safe for the backend: strips control characters and bounds the
/// length.
///
/// Keys longer than `max_length` bytes are deterministically shortened to a
/// prefix of at most `max_length - 33` bytes (cut on a character boundary)
/// followed by `-` and the md5 hex digest of the full sanitized key, so that
/// two keys differing only beyond the truncation point still diverge.
///
/// # Examples
///
/// ```
/// use mintcache::{sanitize_key, MAX_KEY_LENGTH};
///
/// let a = sanitize_key(&"x".repeat(300), MAX_KEY_LENGTH);
/// let b = sanitize_key(&"y".repeat(300), MAX_KEY_LENGTH);
/// assert!(a.len() <= MAX_KEY_LENGTH);
/// assert_ne!(a, b);
///
/// assert_eq!(sanitize_key("spaced\tkey\n", MAX_KEY_LENGTH), "spacedkey");
/// ```
pub fn sanitize_key(key: &str, max_length: usize) -> String {
    let cleaned: String = key.chars().filter(|&c| !is_control_char(c)).collect();
    if cleaned.len() <= max_length {
        return cleaned;
    }

    let digest = hex::encode(Md5::digest(cleaned.as_bytes()));
    let mut cut = max_length.saturating_sub(HASH_SUFFIX_LENGTH);
    while !cleaned.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}-{}", &cleaned[..cut], digest)
}
