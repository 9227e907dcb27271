//! Override merge over the known spec fields.
//!
//! A user value replaces the current one only when it is set: non-empty
//! strings, lists and maps, `Some` options, non-zero numbers. Plain `bool`
//! always takes the user value so an explicit `false` propagates; toggles that
//! need a `true` default are modelled as `Option<bool>` instead.

use std::collections::BTreeMap;

pub trait Merge {
    fn merge_from(&mut self, user: &Self);
}

impl Merge for String {
    fn merge_from(&mut self, user: &Self) {
        if !user.is_empty() { self.clone_from(user); }
    }
}

impl Merge for bool {
    fn merge_from(&mut self, user: &Self) { *self = *user; }
}

impl Merge for i32 {
    fn merge_from(&mut self, user: &Self) {
        if *user != 0 { *self = *user; }
    }
}

impl<T: Clone> Merge for Option<T> {
    fn merge_from(&mut self, user: &Self) {
        if user.is_some() { self.clone_from(user); }
    }
}

impl<T: Clone> Merge for Vec<T> {
    fn merge_from(&mut self, user: &Self) {
        if !user.is_empty() { self.clone_from(user); }
    }
}

impl Merge for BTreeMap<String, String> {
    fn merge_from(&mut self, user: &Self) {
        for (k, v) in user { self.insert(k.clone(), v.clone()); }
    }
}

/// Implement [`Merge`] for a struct by visiting every listed field. The
/// destructuring pattern fails to compile if a field is left out.
#[macro_export]
macro_rules! merge_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::merge::Merge for $ty {
            fn merge_from(&mut self, user: &Self) {
                let Self { $($field),* } = user;
                $( $crate::merge::Merge::merge_from(&mut self.$field, $field); )*
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Inner { name: String, on: bool, toggle: Option<bool> }
    merge_fields!(Inner { name, on, toggle });

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Outer { inner: Inner, port: i32, hosts: Vec<String>, labels: BTreeMap<String, String> }
    merge_fields!(Outer { inner, port, hosts, labels });

    fn defaults() -> Outer {
        Outer {
            inner: Inner { name: "default".into(), on: true, toggle: Some(true) },
            port: 8080,
            hosts: vec!["a".into()],
            labels: BTreeMap::from([("team".to_string(), "core".to_string())]),
        }
    }

    #[test]
    fn unset_user_fields_keep_defaults_except_bools() {
        let mut d = defaults();
        d.merge_from(&Outer::default());
        assert_eq!(d.inner.name, "default");
        assert_eq!(d.inner.toggle, Some(true));
        assert_eq!(d.port, 8080);
        assert_eq!(d.hosts, vec!["a".to_string()]);
        // plain bool follows the user even when it is the zero value
        assert!(!d.inner.on);
    }

    #[test]
    fn set_user_fields_win() {
        let mut d = defaults();
        let user = Outer {
            inner: Inner { name: "mine".into(), on: true, toggle: Some(false) },
            port: 9090,
            hosts: vec!["b".into(), "c".into()],
            labels: BTreeMap::from([("team".to_string(), "ml".to_string()), ("x".to_string(), "y".to_string())]),
        };
        d.merge_from(&user);
        assert_eq!(d, user);
    }

    #[test]
    fn merging_a_merged_value_is_a_fixpoint() {
        let mut once = defaults();
        once.merge_from(&Outer { port: 1, ..Default::default() });
        let mut twice = defaults();
        twice.merge_from(&once);
        assert_eq!(once, twice);
    }
}
