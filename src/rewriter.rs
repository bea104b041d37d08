//! Rewriting of `server.<method>(<args>)` calls in inline click
//! expressions.

use lazy_static::lazy_static;
use regex::Regex;

/// Replaces server method calls in a script expression, passing all
/// other text through verbatim. Callers don't depend on how calls are
/// recognized.
pub trait ExpressionRewriter: Send + Sync {
    /// `replacer` gets the method name and the raw (unparsed)
    /// argument text of each call, in order of appearance, and
    /// returns the text to put in its place.
    fn rewrite(&self, expression: &str, replacer: &mut dyn FnMut(&str, &str) -> String)
               -> String;
}

lazy_static!{
    static ref SERVER_CALL: Regex =
        Regex::new(r"server\.([a-zA-Z_$][a-zA-Z0-9_$]*)\s*\(([^)]*)\)")
        .expect("valid regex");
}

/// Lexical matching only: argument lists can't contain parentheses
/// (`server.f(g(1))` is not recognized as a whole), and `server.`
/// inside string literals is rewritten, too.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexClickRewriter;

impl ExpressionRewriter for RegexClickRewriter {
    fn rewrite(&self, expression: &str, replacer: &mut dyn FnMut(&str, &str) -> String)
               -> String {
        let mut out = String::with_capacity(expression.len());
        let mut last = 0;
        for caps in SERVER_CALL.captures_iter(expression) {
            if let (Some(whole), Some(method), Some(args)) = (caps.get(0), caps.get(1), caps.get(2)) {
                out.push_str(&expression[last..whole.start()]);
                out.push_str(&replacer(method.as_str(), args.as_str()));
                last = whole.end();
            }
        }
        out.push_str(&expression[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rewrite_all(expr: &str) -> (String, Vec<(String, String)>) {
        let mut seen = Vec::new();
        let out = RegexClickRewriter.rewrite(expr, &mut |m: &str, a: &str| {
            seen.push((m.to_owned(), a.to_owned()));
            format!("CALL{}", seen.len() - 1)
        });
        (out, seen)
    }

    #[test]
    fn t_single_call() {
        let (out, seen) = rewrite_all("server.save(1, 'x')");
        assert_eq!(out, "CALL0");
        assert!(!out.contains("server.save("));
        assert_eq!(seen, vec![("save".to_owned(), "1, 'x'".to_owned())]);
    }

    #[test]
    fn t_surroundings_preserved() {
        let (out, seen) = rewrite_all(
            "if (!confirm('ok?')) return; server.save (a, b); other(); server.$go_2();");
        assert_eq!(out, "if (!confirm('ok?')) return; CALL0; other(); CALL1;");
        assert_eq!(seen, vec![("save".to_owned(), "a, b".to_owned()),
                              ("$go_2".to_owned(), "".to_owned())]);
    }

    #[test]
    fn t_no_calls() {
        let (out, seen) = rewrite_all("alert('server')");
        assert_eq!(out, "alert('server')");
        assert!(seen.is_empty());
    }

    #[test]
    fn t_nested_parens_limitation() {
        // The argument list stops at the first closing parenthesis.
        let (out, seen) = rewrite_all("server.f(g(1))");
        assert_eq!(seen, vec![("f".to_owned(), "g(1".to_owned())]);
        assert_eq!(out, "CALL0)");
    }
}
