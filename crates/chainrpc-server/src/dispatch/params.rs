//! Positional parameter binding
//!
//! A handler declares its parameters as a tuple; each JSON parameter is
//! deserialized into the tuple element at the same position. Missing trailing
//! parameters bind as `null`, so `Option<T>` elements fall back to a default.

use serde::de::DeserializeOwned;
use serde_json::Value;

pub trait FromParams: Sized + Send + 'static {
    /// Number of positional parameters accepted
    const ARITY: usize;

    fn from_params(params: Vec<Value>) -> Result<Self, String>;
}

fn check_count(params: &[Value], arity: usize) -> Result<(), String> {
    if params.len() > arity {
        return Err(format!(
            "expected at most {} parameter(s), got {}",
            arity,
            params.len()
        ));
    }
    Ok(())
}

fn bind<T: DeserializeOwned>(
    params: &mut impl Iterator<Item = Value>,
    position: usize,
) -> Result<T, String> {
    let value = params.next().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| format!("parameter {}: {}", position, e))
}

impl FromParams for () {
    const ARITY: usize = 0;

    fn from_params(params: Vec<Value>) -> Result<Self, String> {
        check_count(&params, 0)
    }
}

macro_rules! impl_from_params {
    ($arity:expr; $($ty:ident => $pos:expr),+) => {
        impl<$($ty),+> FromParams for ($($ty,)+)
        where
            $($ty: DeserializeOwned + Send + 'static),+
        {
            const ARITY: usize = $arity;

            fn from_params(params: Vec<Value>) -> Result<Self, String> {
                check_count(&params, Self::ARITY)?;
                let mut params = params.into_iter();
                Ok(($(bind::<$ty>(&mut params, $pos)?,)+))
            }
        }
    };
}

impl_from_params!(1; A => 0);
impl_from_params!(2; A => 0, B => 1);
impl_from_params!(3; A => 0, B => 1, C => 2);
impl_from_params!(4; A => 0, B => 1, C => 2, D => 3);
impl_from_params!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_from_params!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exact_binding() {
        let (a, b): (String, u32) = FromParams::from_params(vec![json!("hash"), json!(2)]).unwrap();
        assert_eq!(a, "hash");
        assert_eq!(b, 2);
    }

    #[test]
    fn test_missing_trailing_params_are_null() {
        let (a, b, c): (u64, Option<bool>, Option<String>) =
            FromParams::from_params(vec![json!(7)]).unwrap();
        assert_eq!(a, 7);
        assert_eq!(b, None);
        assert_eq!(c, None);
    }

    #[test]
    fn test_missing_required_param_fails() {
        let err = <(u64, String)>::from_params(vec![json!(7)]).unwrap_err();
        assert!(err.starts_with("parameter 1:"), "{}", err);
    }

    #[test]
    fn test_too_many_params() {
        let err = <(u64,)>::from_params(vec![json!(1), json!(2)]).unwrap_err();
        assert_eq!(err, "expected at most 1 parameter(s), got 2");

        assert!(<()>::from_params(vec![json!(1)]).is_err());
        assert!(<()>::from_params(vec![]).is_ok());
    }

    #[test]
    fn test_type_mismatch() {
        let err = <(u32,)>::from_params(vec![json!("nope")]).unwrap_err();
        assert!(err.contains("parameter 0"));
    }
}
