//! Host functions exposed to every plugin
//!
//! The catalogue is fixed and is the script-facing ABI:
//!
//! | name            | legacy alias  | returns                           |
//! |-----------------|---------------|-----------------------------------|
//! | `fetch`         | `get`         | body, or nothing on failure       |
//! | `computeSquare` | `square`      | integer square                    |
//! | `terminate`     | `exit`        | never returns                     |
//! | `encodeJSON`    | `json_encode` | text, or `nil, err`               |
//! | `decodeJSON`    | `json_decode` | table, or `nil, err`              |
//!
//! Each function is a plain `fn` over [`HostValue`]s returning
//! `Result<Vec<HostValue>, HostError>`. How an `Err` reaches the script is
//! decided per function by its [`ErrorConvention`].

use std::cell::Cell;
use std::rc::Rc;

use mlua::{Lua, MultiValue, Value};
use reqwest::blocking::Client;

use crate::config::FetchOptions;
use crate::plugins::error::HostError;
use crate::plugins::value::{self, HostValue};

/// How script arguments become host values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgConversion {
    /// An unconvertible argument fails the call
    Strict,
    /// An unconvertible argument reads as null and is left to the
    /// function's own coercion
    Lenient,
}

/// How a host-function failure is shown to the calling script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorConvention {
    /// Return no values at all
    Empty,
    /// Return `nil, message`
    ErrorValue,
    /// Raise a Lua error
    Raise,
}

pub type HostCall = fn(&BridgeContext, Vec<HostValue>) -> Result<Vec<HostValue>, HostError>;

/// One entry of the host-function catalogue
pub struct HostFunction {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Arguments looked at. Missing ones read as nil, extra ones are dropped.
    pub arity: usize,
    pub args: ArgConversion,
    pub on_error: ErrorConvention,
    pub call: HostCall,
}

pub const CATALOGUE: &[HostFunction] = &[
    HostFunction {
        name: "fetch",
        aliases: &["get"],
        arity: 1,
        args: ArgConversion::Lenient,
        on_error: ErrorConvention::Empty,
        call: fetch,
    },
    HostFunction {
        name: "computeSquare",
        aliases: &["square"],
        arity: 1,
        args: ArgConversion::Lenient,
        on_error: ErrorConvention::Raise,
        call: compute_square,
    },
    HostFunction {
        name: "terminate",
        aliases: &["exit"],
        arity: 1,
        args: ArgConversion::Lenient,
        on_error: ErrorConvention::Raise,
        call: terminate,
    },
    HostFunction {
        name: "encodeJSON",
        aliases: &["json_encode"],
        arity: 1,
        args: ArgConversion::Strict,
        on_error: ErrorConvention::ErrorValue,
        call: encode_json,
    },
    HostFunction {
        name: "decodeJSON",
        aliases: &["json_decode"],
        arity: 1,
        args: ArgConversion::Lenient,
        on_error: ErrorConvention::ErrorValue,
        call: decode_json,
    },
];

/// Records a `terminate` request made inside one environment
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal(Rc<Cell<Option<i32>>>);

impl TerminationSignal {
    pub fn request(&self, code: i32) {
        // first request wins
        if self.0.get().is_none() {
            self.0.set(Some(code));
        }
    }

    pub fn requested(&self) -> Option<i32> {
        self.0.get()
    }
}

/// Per-environment state the host functions run against
pub struct BridgeContext {
    client: Client,
    termination: TerminationSignal,
}

impl BridgeContext {
    pub fn new(options: &FetchOptions, termination: TerminationSignal) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .build()?;

        Ok(Self { client, termination })
    }
}

/// Bind the whole catalogue into the globals of `lua`
pub fn register_host_functions(lua: &Lua, context: Rc<BridgeContext>) -> mlua::Result<()> {
    let globals = lua.globals();

    for function in CATALOGUE {
        // one callable per name, so tracebacks show the name that was called
        for name in std::iter::once(&function.name).chain(function.aliases) {
            let context = Rc::clone(&context);
            let callable = lua.create_function(move |lua, args: MultiValue| {
                invoke(lua, &context, function, args)
            })?;
            globals.set(*name, callable)?;
        }
    }

    Ok(())
}

fn invoke(
    lua: &Lua,
    context: &BridgeContext,
    function: &HostFunction,
    args: MultiValue,
) -> mlua::Result<MultiValue> {
    // A terminated environment gets no further host services
    if let Some(code) = context.termination.requested() {
        return Err(mlua::Error::external(HostError::Terminated(code)));
    }

    let result = convert_args(function, args).and_then(|args| (function.call)(context, args));

    match result {
        Ok(values) => into_multi(lua, &values),
        Err(HostError::Terminated(code)) => {
            crate::log_notice!("terminate({}) requested", code);
            context.termination.request(code);
            Err(mlua::Error::external(HostError::Terminated(code)))
        }
        Err(err) => match function.on_error {
            ErrorConvention::Empty => {
                crate::log_debug!("{} failed: {}", function.name, err);
                Ok(MultiValue::new())
            }
            ErrorConvention::ErrorValue => {
                into_multi(lua, &[HostValue::Null, HostValue::Error(err.to_string())])
            }
            ErrorConvention::Raise => {
                Err(mlua::Error::runtime(format!("{}: {}", function.name, err)))
            }
        },
    }
}

fn convert_args(function: &HostFunction, args: MultiValue) -> Result<Vec<HostValue>, HostError> {
    let mut args: Vec<Value> = args.into_iter().collect();
    args.resize(function.arity, Value::Nil);

    args.iter()
        .map(|arg| match (value::from_lua(arg), function.args) {
            (Err(_), ArgConversion::Lenient) => Ok(HostValue::Null),
            (converted, _) => converted,
        })
        .collect()
}

fn into_multi(lua: &Lua, values: &[HostValue]) -> mlua::Result<MultiValue> {
    let values = values
        .iter()
        .map(|v| value::to_lua(lua, v))
        .collect::<mlua::Result<Vec<_>>>()?;
    Ok(MultiValue::from_vec(values))
}

fn first(args: &[HostValue]) -> &HostValue {
    args.first().unwrap_or(&HostValue::Null)
}

fn fetch(context: &BridgeContext, args: Vec<HostValue>) -> Result<Vec<HostValue>, HostError> {
    let url = first(&args).to_text();
    crate::log_debug!("fetch {}", url);

    // any status is fine, only transport and read errors fail
    let response = context.client.get(url.as_str()).send()?;
    let body = response.text()?;

    Ok(vec![HostValue::String(body)])
}

fn compute_square(_: &BridgeContext, args: Vec<HostValue>) -> Result<Vec<HostValue>, HostError> {
    let n = first(&args).to_int();
    Ok(vec![HostValue::Int(n.wrapping_mul(n))])
}

fn terminate(_: &BridgeContext, args: Vec<HostValue>) -> Result<Vec<HostValue>, HostError> {
    Err(HostError::Terminated(first(&args).to_int() as i32))
}

fn encode_json(_: &BridgeContext, args: Vec<HostValue>) -> Result<Vec<HostValue>, HostError> {
    let text = value::encode_json(first(&args))?;
    Ok(vec![HostValue::String(text)])
}

fn decode_json(_: &BridgeContext, args: Vec<HostValue>) -> Result<Vec<HostValue>, HostError> {
    let map = value::decode_json(&first(&args).to_text())?;
    Ok(vec![HostValue::Map(map)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    fn bridged_lua() -> (Lua, TerminationSignal) {
        bridged_lua_with(&FetchOptions::default())
    }

    fn bridged_lua_with(options: &FetchOptions) -> (Lua, TerminationSignal) {
        let lua = Lua::new();
        let signal = TerminationSignal::default();
        let context = BridgeContext::new(options, signal.clone()).unwrap();
        register_host_functions(&lua, Rc::new(context)).unwrap();
        (lua, signal)
    }

    /// Answer one HTTP request, returning the request head it received
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/data", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }

            write!(
                stream,
                "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            )
            .unwrap();
            head.to_lowercase()
        });

        (url, handle)
    }

    #[test]
    fn test_catalogue_names_are_bound() {
        let (lua, _) = bridged_lua();
        for name in [
            "fetch",
            "computeSquare",
            "terminate",
            "encodeJSON",
            "decodeJSON",
            "get",
            "square",
            "exit",
            "json_encode",
            "json_decode",
        ] {
            assert!(lua.globals().get::<Value>(name).unwrap().is_function(), "{} missing", name);
        }
    }

    #[test]
    fn test_compute_square() {
        let (lua, _) = bridged_lua();
        let check = |code: &str, expected: i64| {
            assert_eq!(lua.load(code).eval::<i64>().unwrap(), expected, "{}", code);
        };
        check("return computeSquare(9)", 81);
        check("return computeSquare(0)", 0);
        check("return computeSquare(-4)", 16);
        check("return computeSquare(2.9)", 4);
        check("return computeSquare('3')", 9);
        check("return computeSquare(nil)", 0);
        check("return computeSquare(3, 'ignored')", 9);
        check("return square(5)", 25);
        assert_eq!(
            lua.load("return math.type(computeSquare(9))").eval::<String>().unwrap(),
            "integer"
        );
    }

    #[test]
    fn test_json_round_trip_in_lua() {
        let (lua, _) = bridged_lua();
        lua.load(
            r#"
            local text, err = encodeJSON({s = "x", i = 42, f = 1.5, b = false})
            assert(err == nil, err)
            local t, derr = decodeJSON(text)
            assert(derr == nil, derr)
            assert(t.s == "x" and t.i == 42 and t.f == 1.5 and t.b == false)
            assert(math.type(t.i) == "integer")
            assert(math.type(t.f) == "float")
            "#,
        )
        .exec()
        .unwrap();
    }

    #[test]
    fn test_decode_unsupported_type() {
        let (lua, _) = bridged_lua();
        let (table, err): (Value, String) = lua
            .load(r#"return decodeJSON("{\"a\":1,\"b\":[1,2]}")"#)
            .eval()
            .unwrap();
        assert!(table.is_nil());
        assert_eq!(err, "unsupported type");
    }

    #[test]
    fn test_decode_parse_error_is_returned() {
        let (lua, _) = bridged_lua();
        let (table, err): (Value, String) = lua.load(r#"return json_decode("{oops")"#).eval().unwrap();
        assert!(table.is_nil());
        assert!(!err.is_empty());
    }

    #[test]
    fn test_encode_failure_is_returned() {
        let (lua, _) = bridged_lua();
        let (text, err): (Value, String) = lua.load("return encodeJSON({f = print})").eval().unwrap();
        assert!(text.is_nil());
        assert_eq!(err, "unsupported type");

        let (text, err): (Value, String) = lua.load("return encodeJSON({x = 0/0})").eval().unwrap();
        assert!(text.is_nil());
        assert!(err.contains("non-finite"));
    }

    #[test]
    fn test_fetch_returns_body_for_any_status() {
        let (lua, _) = bridged_lua();
        let (url, server) = serve_once("HTTP/1.1 404 Not Found", "hello");

        let body: String = lua.load(format!("return fetch({:?})", url)).eval().unwrap();
        assert_eq!(body, "hello");

        let head = server.join().unwrap();
        assert!(head.starts_with("get /data "));
        assert!(head.contains("user-agent: lua-plugin-host/"), "{}", head);
    }

    #[test]
    fn test_fetch_sends_configured_user_agent() {
        let options = FetchOptions {
            user_agent: "weather-plugin/2.0".to_string(),
            ..FetchOptions::default()
        };
        let (lua, _) = bridged_lua_with(&options);
        let (url, server) = serve_once("HTTP/1.1 200 OK", "{\"ok\":true}");

        let ok: bool = lua
            .load(format!("return decodeJSON(get({:?})).ok", url))
            .eval()
            .unwrap();
        assert!(ok);
        assert!(server.join().unwrap().contains("user-agent: weather-plugin/2.0"));
    }

    #[test]
    fn test_scalar_arguments_coerce_unconvertible_values() {
        let (lua, _) = bridged_lua();
        assert_eq!(lua.load("return computeSquare(print)").eval::<i64>().unwrap(), 0);
        assert_eq!(lua.load("return computeSquare({f = print})").eval::<i64>().unwrap(), 0);
        assert_eq!(lua.load("return select('#', fetch(print))").eval::<i64>().unwrap(), 0);
    }

    #[test]
    fn test_terminate_with_unconvertible_status() {
        let (lua, signal) = bridged_lua();
        assert!(lua.load("terminate(print)").exec().is_err());
        assert_eq!(signal.requested(), Some(0));

        let (lua, signal) = bridged_lua();
        assert!(lua.load("exit({f = print})").exec().is_err());
        assert_eq!(signal.requested(), Some(0));
    }

    #[test]
    fn test_traceback_names_the_called_function() {
        let (lua, _) = bridged_lua();
        let err = lua.load("terminate(3)").exec().unwrap_err().to_string();
        assert!(err.contains("'terminate'"), "{}", err);
        assert!(!err.contains("'exit'"), "{}", err);
    }

    #[test]
    fn test_fetch_failure_returns_nothing() {
        let (lua, _) = bridged_lua();
        let count = |code: &str| lua.load(code).eval::<i64>().unwrap();
        assert_eq!(count("return select('#', fetch('http://127.0.0.1:1/'))"), 0);
        assert_eq!(count("return select('#', fetch('not a url'))"), 0);
        assert_eq!(count("return select('#', get())"), 0);
    }

    #[test]
    fn test_terminate_unwinds_and_sticks() {
        let (lua, signal) = bridged_lua();
        let result = lua.load("terminate(42); marker = true").exec();
        assert!(result.is_err());
        assert_eq!(signal.requested(), Some(42));
        assert!(lua.globals().get::<Value>("marker").unwrap().is_nil());

        // swallowing the error does not bring host services back
        let ok = lua.load("return pcall(computeSquare, 2)").eval::<bool>().unwrap();
        assert!(!ok);
        assert_eq!(signal.requested(), Some(42));
    }

    #[test]
    fn test_terminate_first_request_wins() {
        let signal = TerminationSignal::default();
        signal.request(3);
        signal.request(4);
        assert_eq!(signal.requested(), Some(3));
    }
}
