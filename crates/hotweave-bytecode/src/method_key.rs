//! Method keys
//!
//! A method key is the lookup identity shared by the weaver (which embeds it
//! as a string literal in every dispatch prologue) and the runtime registry
//! (which stores replacement delegates under it). The key is the simple
//! method name followed by the parenthesised, comma-separated full names of
//! the parameter types, for example `Speak()` or `Add(System.Int32,System.String)`.
//! The return type is deliberately not part of the key.

/// Build the method key for a method name and its ordered parameter type names.
pub fn method_key<S: AsRef<str>>(name: &str, param_types: &[S]) -> String {
    let params_len: usize = param_types.iter().map(|p| p.as_ref().len() + 1).sum();
    let mut key = String::with_capacity(name.len() + params_len + 2);
    key.push_str(name);
    key.push('(');
    for (i, param) in param_types.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(param.as_ref());
    }
    key.push(')');
    key
}
