//! Import-level scenarios, driving the handlers the way a guest would
//!
//! Each test lays out a stack frame in a plain byte vector, calls one or more
//! imports by name, and checks what they wrote back.

mod common;

use common::{at, TestGuest};
use gowasm::value::codec::{self, NAN_HEAD, TYPE_FLAG_FUNCTION, TYPE_FLAG_OBJECT};
use gowasm::value::table::GLOBAL_ID;
use gowasm::{BridgeConfig, Error, Object, Value};

mod strings {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_string_round_trip() {
        let mut g = TestGuest::new();
        g.put_slice(at(8), 4096, b"hello");
        g.call("syscall/js.stringVal").unwrap();
        let cell = g.mem().get_u64(at(24)).unwrap();

        g.mem().set_u64(at(8), cell).unwrap();
        g.call("syscall/js.valuePrepareString").unwrap();
        assert_eq!(g.mem().get_i64(at(24)).unwrap(), 5);

        let prepared = g.mem().get_u64(at(16)).unwrap();
        g.mem().set_u64(at(8), prepared).unwrap();
        g.put_slice(at(16), 8192, &[0; 5]);
        g.call("syscall/js.valueLoadString").unwrap();
        assert_eq!(g.mem().bytes(8192, 5).unwrap(), b"hello");
    }

    #[test]
    fn test_property_string_round_trip() {
        let mut g = TestGuest::new();
        let obj = Value::object(Object::new("o"));
        g.put_value(at(8), &obj);
        g.put_slice(at(16), 4096, b"msg");
        g.put_value(at(32), &Value::string("ok"));
        g.call("syscall/js.valueSet").unwrap();

        g.mem().set_u64(at(32), 0).unwrap();
        g.call("syscall/js.valueGet").unwrap();
        let msg = g.get_value(at(32));
        assert_eq!(msg, Value::string("ok"));

        g.put_value(at(8), &msg);
        g.call("syscall/js.valuePrepareString").unwrap();
        assert_eq!(g.mem().get_i64(at(24)).unwrap(), 2);

        let prepared = g.mem().get_u64(at(16)).unwrap();
        g.mem().set_u64(at(8), prepared).unwrap();
        g.put_slice(at(16), 8192, &[0; 2]);
        g.call("syscall/js.valueLoadString").unwrap();
        assert_eq!(g.mem().bytes(8192, 2).unwrap(), b"ok");
    }

    #[test]
    fn test_same_string_gets_same_cell() {
        let mut g = TestGuest::new();
        g.put_slice(at(8), 4096, b"dup");
        g.call("syscall/js.stringVal").unwrap();
        let first = g.mem().get_u64(at(24)).unwrap();
        g.call("syscall/js.stringVal").unwrap();
        assert_eq!(g.mem().get_u64(at(24)).unwrap(), first);
    }

    #[test]
    fn test_prepare_string_of_primitives() {
        let mut g = TestGuest::new();
        for (value, expected) in [
            (Value::Undefined, "undefined"),
            (Value::Null, "null"),
            (Value::Boolean(true), "true"),
            (Value::Number(42.0), "42"),
            (Value::Number(f64::INFINITY), "Infinity"),
        ] {
            g.put_value(at(8), &value);
            g.call("syscall/js.valuePrepareString").unwrap();
            assert_eq!(g.get_value(at(16)), Value::string(expected));
            assert_eq!(g.mem().get_i64(at(24)).unwrap(), expected.len() as i64);
        }
    }
}

mod calls {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_method_call() {
        let mut g = TestGuest::new();
        let obj = Value::object(Object::new("o"));
        g.put_value(at(8), &obj);
        g.put_slice(at(16), 4096, b"nope");
        g.put_values(at(32), 4200, &[]);
        g.call("syscall/js.valueCall").unwrap();

        assert_eq!(g.mem().get_u8(at(64)).unwrap(), 0);
        let thrown = g.get_value(at(56));
        assert_eq!(thrown.get("name").unwrap(), Value::string("TypeError"));

        // The guest reports the failure by reading its message back.
        g.put_value(at(8), &thrown);
        g.put_slice(at(16), 4096, b"message");
        g.call("syscall/js.valueGet").unwrap();
        let message = g.get_value(at(32));
        assert!(message.as_str().unwrap().contains("nope"));

        g.put_value(at(8), &message);
        g.call("syscall/js.valuePrepareString").unwrap();
        assert!(g.mem().get_i64(at(24)).unwrap() > 0);
    }

    #[test]
    fn test_call_on_global_object() {
        let mut g = TestGuest::new();
        g.mem().set_u64(at(8), codec::boxed(GLOBAL_ID, TYPE_FLAG_OBJECT)).unwrap();
        g.put_slice(at(16), 4096, b"fs");
        g.call("syscall/js.valueGet").unwrap();
        let fs = g.get_value(at(32));

        g.put_value(at(8), &fs);
        g.put_slice(at(16), 4096, b"writeSync");
        let buf = Value::array(b"from go\n".to_vec());
        g.put_values(at(32), 4200, &[Value::Number(1.0), buf]);
        g.call("syscall/js.valueCall").unwrap();
        assert_eq!(g.mem().get_u8(at(64)).unwrap(), 1);
        assert_eq!(g.get_value(at(56)), Value::Number(8.0));
        assert_eq!(g.host.stdio().take_stdout(), b"from go\n");
    }

    #[test]
    fn test_function_cells_carry_function_flag() {
        let mut g = TestGuest::new();
        let global = g.host.global();
        let console = global.get("console").unwrap();
        let log = console.get("log").unwrap();
        g.put_value(at(8), &log);
        let cell = g.mem().get_u64(at(8)).unwrap();
        assert_eq!((cell >> 32) as u32, NAN_HEAD | TYPE_FLAG_FUNCTION);

        g.put_values(at(16), 4200, &[Value::string("hi")]);
        g.call("syscall/js.valueInvoke").unwrap();
        assert_eq!(g.mem().get_u8(at(48)).unwrap(), 1);
        assert_eq!(g.host.stdio().take_stdout(), b"hi\n");
    }

    #[test]
    fn test_host_value_installed_on_global() {
        let mut g = TestGuest::new();
        g.host
            .global()
            .set("answer", Value::Number(42.0))
            .unwrap();
        g.mem().set_u64(at(8), codec::boxed(GLOBAL_ID, TYPE_FLAG_OBJECT)).unwrap();
        g.put_slice(at(16), 4096, b"answer");
        g.call("syscall/js.valueGet").unwrap();
        assert_eq!(g.get_value(at(32)), Value::Number(42.0));
    }

    #[test]
    fn test_lenient_lookups() {
        let mut g = TestGuest::with_config(BridgeConfig {
            capture_output: true,
            lenient_lookups: true,
            ..BridgeConfig::default()
        });
        g.mem().set_u64(at(8), codec::boxed(GLOBAL_ID, TYPE_FLAG_OBJECT)).unwrap();
        g.put_slice(at(16), 4096, b"document");
        g.mem().set_u64(at(32), 0xdead).unwrap();
        g.call("syscall/js.valueGet").unwrap();
        assert_eq!(g.get_value(at(32)), Value::Undefined);
    }

    #[test]
    fn test_strict_lookup_aborts() {
        let mut g = TestGuest::new();
        g.mem().set_u64(at(8), codec::boxed(GLOBAL_ID, TYPE_FLAG_OBJECT)).unwrap();
        g.put_slice(at(16), 4096, b"document");
        let err = g.call("syscall/js.valueGet").unwrap_err();
        assert!(matches!(err, Error::PropertyMissing(ref p) if p == "document"));
    }
}

mod arrays {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_uint8array(g: &mut TestGuest, len: f64) -> Value {
        let ctor = g.host.global().get("Uint8Array").unwrap();
        g.put_value(at(8), &ctor);
        g.put_values(at(16), 4200, &[Value::Number(len)]);
        g.call("syscall/js.valueNew").unwrap();
        assert_eq!(g.mem().get_u8(at(48)).unwrap(), 1);
        g.get_value(at(40))
    }

    #[test]
    fn test_indexed_array_get() {
        let mut g = TestGuest::new();
        let arr = new_uint8array(&mut g, 3.0);

        g.put_value(at(8), &arr);
        g.put_slice(at(16), 4096, &[10, 20, 30]);
        g.call("syscall/js.copyBytesToJS").unwrap();
        assert_eq!(g.mem().get_i64(at(40)).unwrap(), 3);

        g.put_value(at(8), &arr);
        g.mem().set_i64(at(16), 1).unwrap();
        g.call("syscall/js.valueIndex").unwrap();
        assert_eq!(g.get_value(at(24)), Value::Number(20.0));
    }

    #[test]
    fn test_buffer_copy_bounds() {
        let mut g = TestGuest::new();
        g.put_slice(at(8), 4096, &[0; 2]);
        g.put_value(at(32), &Value::array(vec![1, 2, 3, 4, 5]));
        g.call("syscall/js.copyBytesToGo").unwrap();
        assert_eq!(g.mem().get_i64(at(40)).unwrap(), 2);
        assert_eq!(g.mem().get_u8(at(48)).unwrap(), 1);
        assert_eq!(g.mem().bytes(4096, 3).unwrap(), &[1, 2, 0]);
    }

    #[test]
    fn test_copy_from_non_array_clears_flag() {
        let mut g = TestGuest::new();
        g.put_slice(at(8), 4096, &[0; 2]);
        g.put_value(at(32), &Value::object(Object::new("o")));
        g.mem().set_u8(at(48), 1).unwrap();
        g.call("syscall/js.copyBytesToGo").unwrap();
        assert_eq!(g.mem().get_u8(at(48)).unwrap(), 0);
    }

    #[test]
    fn test_random_values_through_crypto() {
        let mut g = TestGuest::new();
        let arr = new_uint8array(&mut g, 32.0);
        let crypto = g.host.global().get("crypto").unwrap();
        g.put_value(at(8), &crypto);
        g.put_slice(at(16), 4096, b"getRandomValues");
        g.put_values(at(32), 4200, &[arr.clone()]);
        g.call("syscall/js.valueCall").unwrap();
        assert_eq!(g.mem().get_u8(at(64)).unwrap(), 1);
        assert!(arr.as_array().unwrap().borrow().buf.iter().any(|b| *b != 0));
    }
}

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exit_propagation() {
        let mut g = TestGuest::new();
        g.mem().set_i32(at(8), 0).unwrap();
        let err = g.call("runtime.wasmExit").unwrap_err();
        assert!(matches!(err, Error::Exit(0)));
        assert_eq!(g.host.exit_code(), Some(0));
    }

    #[test]
    fn test_out_of_bounds_frame_is_fatal() {
        let mut g = TestGuest::new();
        g.mem.truncate(at(10) as usize);
        let err = g.call("runtime.wasmExit").unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bad_cell_is_an_abi_violation() {
        let mut g = TestGuest::new();
        g.mem().set_u64(at(8), codec::boxed(9999, TYPE_FLAG_OBJECT)).unwrap();
        assert!(matches!(g.call("syscall/js.valueLength"), Err(Error::NotFound(9999))));
    }
}
