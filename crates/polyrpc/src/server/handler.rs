//! Typed handler functions.
//!
//! Any `Fn(&T, A1, .., An) -> Result<R, E>` with `Wire` arguments and
//! result, up to six arguments, is a handler. The parameter and return
//! types it declares are what the server decodes arguments against.

use std::fmt;

use polywire::Value;
use polywire::ValueType;
use polywire::Wire;

/// Why a handler call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The arguments did not match the declared parameters.
    BadArguments(String),
    /// The handler returned an error.
    Failed(String),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeError::BadArguments(msg) => write!(f, "bad arguments: {msg}"),
            InvokeError::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for InvokeError {}

/// A method of `T` callable with positional `Args`.
pub trait Handler<T, Args>: Send + Sync + 'static {
    fn param_types() -> Vec<ValueType>;

    fn return_type() -> ValueType;

    fn call(&self, instance: &T, args: Vec<Value>) -> Result<Value, InvokeError>;
}

macro_rules! impl_handler {
    ($($ty:ident $var:ident),*) => {
        impl<T, F, R, E, $($ty,)*> Handler<T, ($($ty,)*)> for F
        where
            F: Fn(&T, $($ty),*) -> Result<R, E> + Send + Sync + 'static,
            R: Wire,
            E: fmt::Display,
            $($ty: Wire,)*
        {
            fn param_types() -> Vec<ValueType> {
                vec![$($ty::value_type()),*]
            }

            fn return_type() -> ValueType {
                R::value_type()
            }

            #[allow(unused_mut, unused_variables)]
            fn call(&self, instance: &T, args: Vec<Value>) -> Result<Value, InvokeError> {
                let expected = <Self as Handler<T, ($($ty,)*)>>::param_types().len();
                if args.len() != expected {
                    return Err(InvokeError::BadArguments(format!(
                        "expected {expected} arguments, got {}",
                        args.len()
                    )));
                }
                let mut args = args.into_iter();
                $(
                    let $var = args
                        .next()
                        .ok_or_else(|| InvokeError::BadArguments("missing argument".into()))
                        .and_then(|v| $ty::from_value(v).map_err(|e| InvokeError::BadArguments(e.to_string())))?;
                )*
                match self(instance, $($var),*) {
                    Ok(value) => Ok(value.to_value()),
                    Err(e) => Err(InvokeError::Failed(e.to_string())),
                }
            }
        }
    };
}

impl_handler!();
impl_handler!(A1 a1);
impl_handler!(A1 a1, A2 a2);
impl_handler!(A1 a1, A2 a2, A3 a3);
impl_handler!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_handler!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_handler!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
