//! Pointer-sized native call dispatch.
//!
//! Every native entry point loom talks to takes between zero and
//! [`MAX_ARGS`] pointer-sized integer arguments and returns an integer of at
//! most 64 bits. A call is either made directly against the target address,
//! or handed to the library's trampoline as `(target, argc, args...)`.
//!
//! All address-to-function-pointer conversion happens in [`NativeFn`]; the
//! rest of the workspace only sees [`CallDiscipline::call`].

use std::fmt;
use std::num::NonZeroUsize;

use crate::error::NativeError;

/// Largest argument count accepted for a native call.
pub const MAX_ARGS: usize = 5;

/// Trampoline calls carry the target address and the argument count in front
/// of the real arguments.
const TRAMPOLINE_PREFIX: usize = 2;

/// A resolved, non-null symbol address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddr(NonZeroUsize);

impl SymbolAddr {
    /// Returns `None` for address zero, which always means "not found".
    pub fn new(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for SymbolAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddr({:#x})", self.get())
    }
}

/// Raw native return value split into two machine words.
///
/// `low` carries the low 32 bits and `high` the high 32 bits, so callers can
/// read the result either as a 32-bit or a 64-bit scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallResult {
    pub low: usize,
    pub high: usize,
}

impl CallResult {
    pub fn from_raw(raw: u64) -> Self {
        Self {
            low: (raw & 0xffff_ffff) as usize,
            high: (raw >> 32) as usize,
        }
    }

    /// Reassemble the full 64-bit return value.
    pub fn value(self) -> u64 {
        ((self.high as u64) << 32) | (self.low as u64 & 0xffff_ffff)
    }
}

/// How calls into a library are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDiscipline {
    /// Cast the target to a function of matching arity and call it.
    Direct,
    /// Call the library's trampoline with `(target, argc, args...)`.
    Trampoline(SymbolAddr),
}

impl CallDiscipline {
    /// Invoke `target` with `args`.
    ///
    /// `symbol` is only used for error reporting. More than [`MAX_ARGS`]
    /// arguments is rejected before anything is called; arguments are never
    /// truncated.
    ///
    /// # Safety
    ///
    /// `target` must be the address of a C-ABI function taking exactly
    /// `args.len()` pointer-sized integer arguments and returning an integer
    /// no wider than 64 bits. In trampoline mode the trampoline must have the
    /// signature `(usize, usize, usize...) -> u64` and forward to `target`.
    pub unsafe fn call(
        self,
        symbol: &str,
        target: SymbolAddr,
        args: &[usize],
    ) -> Result<CallResult, NativeError> {
        if args.len() > MAX_ARGS {
            return Err(NativeError::ArityExceeded {
                symbol: symbol.to_string(),
                count: args.len(),
                max: MAX_ARGS,
            });
        }

        let raw = match self {
            CallDiscipline::Direct => {
                tracing::trace!(symbol, argc = args.len(), "Direct native call");
                // SAFETY: forwarded from the caller's contract.
                unsafe { NativeFn::bind(target, args.len()).invoke(args) }
            }
            CallDiscipline::Trampoline(trampoline) => {
                tracing::trace!(symbol, argc = args.len(), "Trampoline native call");
                let mut framed = [0usize; MAX_ARGS + TRAMPOLINE_PREFIX];
                framed[0] = target.get();
                framed[1] = args.len();
                framed[TRAMPOLINE_PREFIX..TRAMPOLINE_PREFIX + args.len()].copy_from_slice(args);
                let framed = &framed[..TRAMPOLINE_PREFIX + args.len()];
                // SAFETY: forwarded from the caller's contract.
                unsafe { NativeFn::bind(trampoline, framed.len()).invoke(framed) }
            }
        };

        Ok(CallResult::from_raw(raw))
    }
}

type Fn0 = unsafe extern "C" fn() -> u64;
type Fn1 = unsafe extern "C" fn(usize) -> u64;
type Fn2 = unsafe extern "C" fn(usize, usize) -> u64;
type Fn3 = unsafe extern "C" fn(usize, usize, usize) -> u64;
type Fn4 = unsafe extern "C" fn(usize, usize, usize, usize) -> u64;
type Fn5 = unsafe extern "C" fn(usize, usize, usize, usize, usize) -> u64;
type Fn6 = unsafe extern "C" fn(usize, usize, usize, usize, usize, usize) -> u64;
type Fn7 = unsafe extern "C" fn(usize, usize, usize, usize, usize, usize, usize) -> u64;

/// A symbol address bound to a typed function pointer of one arity.
///
/// Arities 6 and 7 only occur for trampoline calls carrying five arguments
/// plus the two-word prefix.
#[derive(Clone, Copy)]
enum NativeFn {
    A0(Fn0),
    A1(Fn1),
    A2(Fn2),
    A3(Fn3),
    A4(Fn4),
    A5(Fn5),
    A6(Fn6),
    A7(Fn7),
}

impl NativeFn {
    /// # Safety
    ///
    /// `addr` must point at a C-ABI function with `arity` pointer-sized
    /// arguments. `arity` must not exceed `MAX_ARGS + TRAMPOLINE_PREFIX`.
    unsafe fn bind(addr: SymbolAddr, arity: usize) -> Self {
        let ptr = addr.get() as *const ();
        // SAFETY: function pointers and data pointers share size and
        // representation on every platform libloading supports; the caller
        // guarantees the signature.
        unsafe {
            match arity {
                0 => NativeFn::A0(std::mem::transmute::<*const (), Fn0>(ptr)),
                1 => NativeFn::A1(std::mem::transmute::<*const (), Fn1>(ptr)),
                2 => NativeFn::A2(std::mem::transmute::<*const (), Fn2>(ptr)),
                3 => NativeFn::A3(std::mem::transmute::<*const (), Fn3>(ptr)),
                4 => NativeFn::A4(std::mem::transmute::<*const (), Fn4>(ptr)),
                5 => NativeFn::A5(std::mem::transmute::<*const (), Fn5>(ptr)),
                6 => NativeFn::A6(std::mem::transmute::<*const (), Fn6>(ptr)),
                _ => NativeFn::A7(std::mem::transmute::<*const (), Fn7>(ptr)),
            }
        }
    }

    /// # Safety
    ///
    /// `args.len()` must equal the arity this value was bound with.
    unsafe fn invoke(self, a: &[usize]) -> u64 {
        unsafe {
            match self {
                NativeFn::A0(f) => f(),
                NativeFn::A1(f) => f(a[0]),
                NativeFn::A2(f) => f(a[0], a[1]),
                NativeFn::A3(f) => f(a[0], a[1], a[2]),
                NativeFn::A4(f) => f(a[0], a[1], a[2], a[3]),
                NativeFn::A5(f) => f(a[0], a[1], a[2], a[3], a[4]),
                NativeFn::A6(f) => f(a[0], a[1], a[2], a[3], a[4], a[5]),
                NativeFn::A7(f) => f(a[0], a[1], a[2], a[3], a[4], a[5], a[6]),
            }
        }
    }
}
