// src/pac/engine.rs
use super::natives::NativeTable;
use crate::error::{PacError, Result};
use crate::log::Logger;
use crate::{log_debug, log_warn};
use boa_engine::vm::RuntimeLimits;
use boa_engine::{Context, JsError, JsString, JsValue, NativeFunction, Source};
use regex::Regex;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::LazyLock;
use std::thread;

/// Name of the function every PAC script must define.
pub const DECISION_FUNCTION: &str = "FindProxyForURL";

const BOOTSTRAP: &str = include_str!("bootstrap.js");

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

pub(crate) struct EngineConfig {
    pub natives: NativeTable,
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

struct Evaluation {
    url: String,
    host: String,
    reply: mpsc::Sender<Result<String>>,
}

/// Handle to the thread that owns the script context.
///
/// `boa_engine::Context` is neither `Send` nor re-entrant, so it never
/// leaves its thread. Evaluations are queued on a single channel and run
/// one at a time. Dropping the handle closes the queue and ends the thread.
pub(crate) struct Engine {
    requests: mpsc::Sender<Evaluation>,
}

impl Engine {
    /// Build the context on a fresh thread and wait until it is ready.
    pub(crate) fn start(content: String, config: EngineConfig, logger: Logger) -> Result<Self> {
        let (requests, inbox) = mpsc::channel::<Evaluation>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        thread::Builder::new()
            .name("pac-engine".to_string())
            .spawn(move || {
                let mut context = match build_context(&content, &config) {
                    Ok(context) => {
                        let _ = ready_tx.send(Ok(()));
                        context
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                log_debug!(logger, natives = config.natives.len(), "PAC engine ready");

                for evaluation in inbox {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        call_decision_function(&mut context, &evaluation.url, &evaluation.host)
                    }))
                    .unwrap_or_else(|payload| Err(PacError::Evaluation(panic_message(&*payload))));
                    if let Err(err) = &result {
                        log_warn!(logger, url = %evaluation.url, error = %err, "PAC evaluation failed");
                    }
                    let _ = evaluation.reply.send(result);
                }
            })
            .map_err(PacError::EngineStart)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { requests }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(PacError::ScriptLoad {
                stage: "PAC engine",
                message: "engine thread exited during startup".to_string(),
            }),
        }
    }

    /// Call the decision function. Blocks while earlier evaluations run.
    pub(crate) fn evaluate(&self, url: &str, host: &str) -> Result<String> {
        let (reply, response) = mpsc::channel();
        self.requests
            .send(Evaluation {
                url: url.to_string(),
                host: host.to_string(),
                reply,
            })
            .map_err(|_| PacError::Evaluation("PAC engine is not running".to_string()))?;
        response
            .recv()
            .map_err(|_| PacError::Evaluation("PAC engine stopped mid-evaluation".to_string()))?
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    format!("native function panicked: {}", detail)
}

fn build_context(content: &str, config: &EngineConfig) -> Result<Context> {
    let mut context = Context::default();

    let mut limits = RuntimeLimits::default();
    limits.set_loop_iteration_limit(config.loop_iteration_limit);
    limits.set_recursion_limit(config.recursion_limit);
    context.set_runtime_limits(limits);

    register_natives(&mut context, &config.natives)?;

    context
        .eval(Source::from_bytes(BOOTSTRAP))
        .map_err(|err| PacError::ScriptLoad {
            stage: "PAC library",
            message: err.to_string(),
        })?;

    context
        .eval(Source::from_bytes(content))
        .map_err(|err| PacError::ScriptLoad {
            stage: "PAC script",
            message: err.to_string(),
        })?;

    Ok(context)
}

/// All-or-nothing: the whole table is checked before anything is registered.
fn register_natives(context: &mut Context, natives: &NativeTable) -> Result<()> {
    let mut seen = HashSet::new();
    for native in natives.iter() {
        if !IDENTIFIER.is_match(native.name) {
            return Err(PacError::NativeRegistration {
                name: native.name.to_string(),
                reason: "not a valid identifier".to_string(),
            });
        }
        if !seen.insert(native.name) {
            return Err(PacError::NativeRegistration {
                name: native.name.to_string(),
                reason: "registered twice".to_string(),
            });
        }
    }

    for native in natives.iter() {
        context
            .register_global_callable(
                JsString::from(native.name),
                native.length,
                NativeFunction::from_fn_ptr(native.function),
            )
            .map_err(|err| PacError::NativeRegistration {
                name: native.name.to_string(),
                reason: err.to_string(),
            })?;
    }

    Ok(())
}

fn call_decision_function(context: &mut Context, url: &str, host: &str) -> Result<String> {
    let failed = |err: JsError| PacError::Evaluation(err.to_string());

    let global = context.global_object();
    let function = global
        .get(JsString::from(DECISION_FUNCTION), context)
        .map_err(failed)?;
    let Some(callable) = function.as_callable() else {
        return Err(PacError::Evaluation(format!(
            "`{}` is not defined",
            DECISION_FUNCTION
        )));
    };

    // Arguments are passed as values, never spliced into source text.
    let args = [
        JsValue::from(JsString::from(url)),
        JsValue::from(JsString::from(host)),
    ];
    let result = callable
        .call(&JsValue::undefined(), &args, context)
        .map_err(failed)?;
    if result.is_null_or_undefined() {
        return Err(PacError::Evaluation(format!(
            "`{}` returned no value",
            DECISION_FUNCTION
        )));
    }

    Ok(result.to_string(context).map_err(failed)?.to_std_string_escaped())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use boa_engine::JsResult;

    fn config() -> EngineConfig {
        EngineConfig {
            natives: NativeTable::standard(),
            loop_iteration_limit: 10_000,
            recursion_limit: 64,
        }
    }

    fn start(content: &str) -> Result<Engine> {
        Engine::start(content.to_string(), config(), Logger::noop())
    }

    fn answer(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
        Ok(JsValue::from(42))
    }

    #[test]
    fn test_evaluates_with_url_and_host() {
        let engine = start(
            "function FindProxyForURL(url, host) { return 'PROXY ' + host + ':3128; DIRECT'; }",
        )
        .unwrap();
        assert_eq!(
            engine.evaluate("http://www.example.com/", "www.example.com").unwrap(),
            "PROXY www.example.com:3128; DIRECT"
        );
    }

    #[test]
    fn test_arguments_are_not_interpreted_as_code() {
        let engine =
            start("function FindProxyForURL(url, host) { return 'DIRECT ' + url.length; }").unwrap();
        let url = "http://x/');throw 1;('";
        assert_eq!(
            engine.evaluate(url, "x").unwrap(),
            format!("DIRECT {}", url.len())
        );
    }

    #[test]
    fn test_bootstrap_helpers_are_available() {
        let engine = start(
            r#"function FindProxyForURL(url, host) {
                if (isPlainHostName(host)) return "DIRECT";
                if (dnsDomainIs(host, ".corp.example")) return "PROXY corp:1";
                if (localHostOrDomainIs(host, "www.example.com")) return "PROXY www:2";
                if (shExpMatch(host, "*.test")) return "PROXY glob:4";
                if (isInNet(host, "10.0.0.0", "255.0.0.0")) return "PROXY net:3";
                return "PROXY levels:" + dnsDomainLevels(host);
            }"#,
        )
        .unwrap();
        assert_eq!(engine.evaluate("http://intranet/", "intranet").unwrap(), "DIRECT");
        assert_eq!(
            engine.evaluate("http://a.corp.example/", "a.corp.example").unwrap(),
            "PROXY corp:1"
        );
        assert_eq!(engine.evaluate("http://www/", "www.example.com").unwrap(), "PROXY www:2");
        assert_eq!(engine.evaluate("http://10.1.2.3/", "10.1.2.3").unwrap(), "PROXY net:3");
        assert_eq!(engine.evaluate("http://a.b.test/", "a.b.test").unwrap(), "PROXY glob:4");
        assert_eq!(engine.evaluate("http://192.168.1.1/", "192.168.1.1").unwrap(), "PROXY levels:3");
    }

    #[test]
    fn test_syntax_error_fails_startup() {
        let err = start("function FindProxyForURL(url, host) { return 'DIRECT'; ").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ScriptLoadFailed);
    }

    #[test]
    fn test_top_level_throw_fails_startup() {
        let err = start("function FindProxyForURL(u, h) { return 'DIRECT'; }\nthrow new Error('boom');")
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ScriptLoadFailed);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_missing_function_fails_evaluation() {
        // Mentions the name but never defines it.
        let engine = start("var note = 'FindProxyForURL';").unwrap();
        let err = engine.evaluate("http://a/", "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationFailed);
    }

    #[test]
    fn test_throw_fails_evaluation_but_engine_survives() {
        let engine = start(
            "function FindProxyForURL(url, host) { if (host === 'bad') throw new Error('nope'); return 'DIRECT'; }",
        )
        .unwrap();
        let err = engine.evaluate("http://bad/", "bad").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationFailed);
        assert_eq!(engine.evaluate("http://good/", "good").unwrap(), "DIRECT");
    }

    #[test]
    fn test_undefined_result_fails_evaluation() {
        let engine = start("function FindProxyForURL(url, host) { }").unwrap();
        let err = engine.evaluate("http://a/", "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationFailed);
    }

    #[test]
    fn test_runaway_loop_is_stopped() {
        let engine =
            start("function FindProxyForURL(url, host) { while (true) {} return 'DIRECT'; }").unwrap();
        let err = engine.evaluate("http://a/", "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationFailed);
    }

    #[test]
    fn test_custom_native_is_callable() {
        let mut config = config();
        config.natives = NativeTable::standard().with("answer", 0, answer);
        let engine = Engine::start(
            "function FindProxyForURL(url, host) { return 'PROXY h:' + answer(); }".to_string(),
            config,
            Logger::noop(),
        )
        .unwrap();
        assert_eq!(engine.evaluate("http://a/", "a").unwrap(), "PROXY h:42");
    }

    fn explode(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
        panic!("native exploded")
    }

    #[test]
    fn test_panicking_native_does_not_stop_engine() {
        let mut config = config();
        config.natives = NativeTable::standard().with("explode", 0, explode);
        let engine = Engine::start(
            "function FindProxyForURL(url, host) { if (host === 'boom') explode(); return 'DIRECT'; }"
                .to_string(),
            config,
            Logger::noop(),
        )
        .unwrap();

        let err = engine.evaluate("http://boom/", "boom").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationFailed);
        assert!(err.to_string().contains("native exploded"));
        assert_eq!(engine.evaluate("http://fine/", "fine").unwrap(), "DIRECT");
    }

    #[test]
    fn test_huge_time_range_arguments_are_harmless() {
        let engine = start(
            "function FindProxyForURL(url, host) { if (host === 'boom' && timeRange(2000000, 2)) return 'PROXY p:1'; return 'DIRECT'; }",
        )
        .unwrap();
        assert_eq!(engine.evaluate("http://boom/", "boom").unwrap(), "DIRECT");
        assert_eq!(engine.evaluate("http://fine/", "fine").unwrap(), "DIRECT");
    }

    #[test]
    fn test_invalid_native_name_aborts_startup() {
        let mut config = config();
        config.natives = NativeTable::standard().with("not valid", 0, answer);
        let err = Engine::start(
            "function FindProxyForURL(url, host) { return 'DIRECT'; }".to_string(),
            config,
            Logger::noop(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::NativeRegistrationFailed);
    }

    #[test]
    fn test_duplicate_native_name_aborts_startup() {
        let mut config = config();
        config.natives = NativeTable::empty().with("answer", 0, answer).with("answer", 0, answer);
        let err = Engine::start(
            "function FindProxyForURL(url, host) { return 'DIRECT'; }".to_string(),
            config,
            Logger::noop(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::NativeRegistrationFailed);
    }
}
