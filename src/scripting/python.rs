//! pyo3 运行时后端
//!
//! 全局锁即 GIL。对象引用为 `Py<PyAny>`，只在持有 GIL 时释放。

use super::runtime::{EmbeddedRuntime, RuntimeFault, RuntimeSession};
use super::value::ScriptValue;
use crate::core::{BridgeError, BridgeResult};
use pyo3::exceptions::PyAttributeError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyList, PyLong, PyString, PyTuple, PyType};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

static PYTHON_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Python 解释器运行时，每个进程至多一个
pub struct PythonRuntime {
    _claim: (),
}

impl PythonRuntime {
    pub fn new() -> BridgeResult<Self> {
        PYTHON_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BridgeError::AlreadyOpen)?;
        Ok(Self { _claim: () })
    }
}

impl Drop for PythonRuntime {
    fn drop(&mut self) {
        PYTHON_CLAIMED.store(false, Ordering::Release);
    }
}

// 解释器可能被终止后重新初始化，不能经由 `PyType::name` 的驻留字符串缓存读取
fn type_name(ty: &Bound<'_, PyType>, fallback: &str) -> String {
    ty.getattr("__name__")
        .and_then(|name| name.extract::<String>())
        .unwrap_or_else(|_| fallback.to_string())
}

fn fault_from(py: Python<'_>, err: PyErr) -> RuntimeFault {
    let kind = type_name(&err.get_type_bound(py), "Exception");
    RuntimeFault::new(kind, err.value_bound(py).to_string())
}

fn to_python(py: Python<'_>, value: &ScriptValue) -> PyResult<PyObject> {
    Ok(match value {
        ScriptValue::Null => py.None(),
        ScriptValue::Bool(b) => b.into_py(py),
        ScriptValue::Int(i) => i.into_py(py),
        ScriptValue::Float(f) => f.into_py(py),
        ScriptValue::String(s) => s.into_py(py),
        ScriptValue::Array(items) => {
            let converted = items
                .iter()
                .map(|item| to_python(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new_bound(py, converted).into_any().unbind()
        }
        ScriptValue::Object(map) => {
            let dict = PyDict::new_bound(py);
            for (key, item) in map {
                dict.set_item(key, to_python(py, item)?)?;
            }
            dict.into_any().unbind()
        }
    })
}

fn from_python(object: &Bound<'_, PyAny>) -> Result<ScriptValue, RuntimeFault> {
    let py = object.py();
    if object.is_none() {
        return Ok(ScriptValue::Null);
    }
    // bool 是 int 的子类，必须先判断
    if let Ok(b) = object.downcast::<PyBool>() {
        return Ok(ScriptValue::Bool(b.is_true()));
    }
    if object.is_instance_of::<PyLong>() {
        return object
            .extract::<i64>()
            .map(ScriptValue::Int)
            .map_err(|e| fault_from(py, e));
    }
    if let Ok(f) = object.downcast::<PyFloat>() {
        return Ok(ScriptValue::Float(f.value()));
    }
    if object.is_instance_of::<PyString>() {
        return object
            .extract::<String>()
            .map(ScriptValue::String)
            .map_err(|e| fault_from(py, e));
    }
    if let Ok(list) = object.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| from_python(&item))
            .collect::<Result<Vec<_>, _>>()
            .map(ScriptValue::Array);
    }
    if let Ok(tuple) = object.downcast::<PyTuple>() {
        return tuple
            .iter()
            .map(|item| from_python(&item))
            .collect::<Result<Vec<_>, _>>()
            .map(ScriptValue::Array);
    }
    if let Ok(dict) = object.downcast::<PyDict>() {
        let mut map = HashMap::with_capacity(dict.len());
        for (key, item) in dict.iter() {
            let key = key.extract::<String>().map_err(|e| fault_from(py, e))?;
            map.insert(key, from_python(&item)?);
        }
        return Ok(ScriptValue::Object(map));
    }

    Err(RuntimeFault::new(
        "TypeError",
        format!(
            "cannot convert '{}' to a script value",
            type_name(&object.get_type(), "object")
        ),
    ))
}

impl EmbeddedRuntime for PythonRuntime {
    type Object = Py<PyAny>;

    fn initialize(&self) -> Result<(), RuntimeFault> {
        // SAFETY: 仅在解释器未初始化时初始化，随后释放初始化线程持有的 GIL，
        // 之后所有访问都经由 `Python::with_gil`。
        unsafe {
            if pyo3::ffi::Py_IsInitialized() == 0 {
                pyo3::ffi::Py_InitializeEx(0);
                pyo3::ffi::PyEval_SaveThread();
            }
        }
        tracing::info!(target: "sensehat::runtime", "Python interpreter ready");
        Ok(())
    }

    fn finalize(&self) -> Result<(), RuntimeFault> {
        // SAFETY: 调用前所有 `Py<PyAny>` 已在持有 GIL 时释放；
        // 终止前先获取 GIL，终止后不再使用该线程状态。
        let status = unsafe {
            if pyo3::ffi::Py_IsInitialized() == 0 {
                return Ok(());
            }
            pyo3::ffi::PyGILState_Ensure();
            pyo3::ffi::Py_FinalizeEx()
        };
        if status < 0 {
            return Err(RuntimeFault::new(
                "SystemError",
                "Py_FinalizeEx reported an error while flushing buffers",
            ));
        }
        tracing::info!(target: "sensehat::runtime", "Python interpreter finalized");
        Ok(())
    }

    fn with_lock<T>(&self, f: impl FnOnce(&dyn RuntimeSession<Object = Py<PyAny>>) -> T) -> T {
        Python::with_gil(|py| f(&PythonSession { py }))
    }
}

struct PythonSession<'py> {
    py: Python<'py>,
}

impl RuntimeSession for PythonSession<'_> {
    type Object = Py<PyAny>;

    fn import_module(&self, name: &str) -> Result<Py<PyAny>, RuntimeFault> {
        PyModule::import_bound(self.py, name)
            .map(|module| module.into_any().unbind())
            .map_err(|e| fault_from(self.py, e))
    }

    fn get_attr(
        &self,
        container: &Py<PyAny>,
        name: &str,
    ) -> Result<Option<Py<PyAny>>, RuntimeFault> {
        match container.bind(self.py).getattr(name) {
            Ok(attr) => Ok(Some(attr.unbind())),
            Err(err) if err.is_instance_of::<PyAttributeError>(self.py) => Ok(None),
            Err(err) => Err(fault_from(self.py, err)),
        }
    }

    fn is_callable(&self, object: &Py<PyAny>) -> bool {
        object.bind(self.py).is_callable()
    }

    fn construct(&self, class: &Py<PyAny>) -> Result<Py<PyAny>, RuntimeFault> {
        class
            .bind(self.py)
            .call0()
            .map(Bound::unbind)
            .map_err(|e| fault_from(self.py, e))
    }

    fn call(
        &self,
        callable: &Py<PyAny>,
        receiver: Option<&Py<PyAny>>,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, RuntimeFault> {
        let py = self.py;
        let mut items: Vec<PyObject> = Vec::with_capacity(args.len() + 1);
        if let Some(receiver) = receiver {
            items.push(receiver.clone_ref(py));
        }
        for arg in args {
            items.push(to_python(py, arg).map_err(|e| fault_from(py, e))?);
        }

        let tuple = PyTuple::new_bound(py, items);
        let result = callable
            .bind(py)
            .call1(tuple)
            .map_err(|e| fault_from(py, e))?;
        from_python(&result)
    }

    fn release(&self, object: Py<PyAny>) -> Result<(), RuntimeFault> {
        drop(object.into_bound(self.py));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::device::{JoystickAction, JoystickDirection, PixelColor, Rotation, SenseHat};
    use crate::scripting::RuntimeContext;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    // 解释器与运行时占用标记都是进程级的
    static SERIAL: Mutex<()> = Mutex::new(());

    const BOARD_MODULE: &str = "sense_hat_fixture";

    const BOARD_SOURCE: &str = r#"
import collections

InputEvent = collections.namedtuple("InputEvent", ("timestamp", "direction", "action"))


class SenseStick:
    def __init__(self):
        self.pending = [
            InputEvent(1.5, "up", "pressed"),
            InputEvent(1.75, "middle", "released"),
        ]

    def get_events(self):
        events, self.pending = self.pending, []
        return events

    def wait_for_event(self, emptybuffer=False):
        return InputEvent(2.0, "left", "held")


class SenseHat:
    def __init__(self):
        self.stick = SenseStick()
        self.pixels = [[0, 0, 0] for _ in range(64)]

    def set_pixel(self, x, y, *args):
        pixel = args[0] if len(args) == 1 else args
        self.pixels[y * 8 + x] = [pixel[0] & 0xF8, pixel[1] & 0xFC, pixel[2] & 0xF8]

    def get_pixel(self, x, y):
        return list(self.pixels[y * 8 + x])

    def get_humidity(self):
        return 41.25

    def get_pressure(self):
        return 1013

    def get_orientation(self):
        return {"pitch": 1.0, "roll": 2.0, "yaw": 3.0}

    def set_rotation(self, r=0, redraw=True):
        self.rotation = r

    def set_imu_config(self, compass_enabled, gyro_enabled, accel_enabled):
        raise ValueError("IMU is not calibrated")


def _noop(self, *args, **kwargs):
    return None


for _name in (
    "clear", "flip_h", "flip_v", "gamma_reset", "get_accelerometer",
    "get_accelerometer_raw", "get_compass", "get_compass_raw", "get_gyroscope",
    "get_gyroscope_raw", "get_orientation_degrees", "get_orientation_radians",
    "get_pixels", "get_temperature", "get_temperature_from_humidity",
    "get_temperature_from_pressure", "load_image", "set_pixels",
    "show_letter", "show_message",
):
    setattr(SenseHat, _name, _noop)
"#;

    fn ready_runtime() -> (MutexGuard<'static, ()>, PythonRuntime) {
        let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let runtime = PythonRuntime::new().unwrap();
        runtime.initialize().unwrap();
        (guard, runtime)
    }

    fn install_board() {
        Python::with_gil(|py| {
            let module = PyModule::from_code_bound(
                py,
                BOARD_SOURCE,
                "sense_hat_fixture.py",
                BOARD_MODULE,
            )
            .unwrap();
            py.import_bound("sys")
                .unwrap()
                .getattr("modules")
                .unwrap()
                .set_item(BOARD_MODULE, module)
                .unwrap();
        });
    }

    fn board_config(finalize_on_close: bool) -> RuntimeConfig {
        RuntimeConfig {
            module_name: BOARD_MODULE.to_string(),
            finalize_on_close,
            ..RuntimeConfig::default()
        }
    }

    fn convert(runtime: &PythonRuntime, expression: &str) -> Result<ScriptValue, RuntimeFault> {
        runtime.with_lock(|_| {
            Python::with_gil(|py| {
                let object = py.eval_bound(expression, None, None).unwrap();
                from_python(&object)
            })
        })
    }

    #[test]
    fn test_second_runtime_is_busy() {
        let (_guard, _runtime) = ready_runtime();
        assert!(matches!(PythonRuntime::new(), Err(BridgeError::AlreadyOpen)));
    }

    #[test]
    fn test_scalar_conversion() {
        let (_guard, runtime) = ready_runtime();
        assert_eq!(convert(&runtime, "None").unwrap(), ScriptValue::Null);
        assert_eq!(convert(&runtime, "True").unwrap(), ScriptValue::Bool(true));
        assert_eq!(convert(&runtime, "7").unwrap(), ScriptValue::Int(7));
        assert_eq!(convert(&runtime, "0.5").unwrap(), ScriptValue::Float(0.5));
        assert_eq!(
            convert(&runtime, "'up'").unwrap(),
            ScriptValue::String("up".to_string())
        );
    }

    #[test]
    fn test_sequence_and_mapping_conversion() {
        let (_guard, runtime) = ready_runtime();
        let event = convert(
            &runtime,
            concat!(
                "__import__('collections')",
                ".namedtuple('E', 'timestamp direction action')(1.0, 'up', 'held')"
            ),
        )
        .unwrap();
        assert_eq!(
            event,
            ScriptValue::Array(vec![
                ScriptValue::Float(1.0),
                ScriptValue::String("up".to_string()),
                ScriptValue::String("held".to_string()),
            ])
        );

        let mapping = convert(&runtime, "{'x': 1.0, 'flag': False}").unwrap();
        let map = mapping.as_object().unwrap();
        assert_eq!(map.get("x"), Some(&ScriptValue::Float(1.0)));
        assert_eq!(map.get("flag"), Some(&ScriptValue::Bool(false)));

        let fault = convert(&runtime, "{1: 2}").unwrap_err();
        assert_eq!(fault.kind, "TypeError");
        let fault = convert(&runtime, "object()").unwrap_err();
        assert_eq!(fault.kind, "TypeError");
        assert!(fault.message.contains("object"));
    }

    #[test]
    fn test_values_round_trip_into_python() {
        let (_guard, runtime) = ready_runtime();
        let value = ScriptValue::Array(vec![
            ScriptValue::Int(248),
            ScriptValue::Null,
            ScriptValue::String("A".to_string()),
        ]);
        let back = runtime.with_lock(|_| {
            Python::with_gil(|py| {
                let object = to_python(py, &value).unwrap();
                from_python(object.bind(py))
            })
        });
        assert_eq!(back.unwrap(), value);
    }

    #[test]
    fn test_session_attributes_and_faults() {
        let (_guard, runtime) = ready_runtime();
        runtime.with_lock(|session| {
            let module = session.import_module("collections").unwrap();
            assert!(session.get_attr(&module, "no_such_attribute").unwrap().is_none());

            let namedtuple = session.get_attr(&module, "namedtuple").unwrap().unwrap();
            assert!(session.is_callable(&namedtuple));
            session.release(namedtuple).unwrap();
            session.release(module).unwrap();

            let fault = session.import_module("no_such_module_for_tests").unwrap_err();
            assert_eq!(fault.kind, "ModuleNotFoundError");
        });
    }

    #[test]
    fn test_device_calls_through_interpreter() {
        let (_guard, runtime) = ready_runtime();
        install_board();
        let context = Arc::new(RuntimeContext::with_config(runtime, board_config(false)));
        let hat = SenseHat::open(context.clone()).unwrap();

        hat.set_pixel(0, 0, Some(PixelColor::new(255, 255, 7))).unwrap();
        assert_eq!(hat.get_pixel(0, 0).unwrap(), PixelColor::new(248, 252, 0));
        assert_eq!(hat.get_humidity().unwrap(), 41.25);
        assert!(matches!(
            hat.get_pressure(),
            Err(BridgeError::ConversionFailed(_))
        ));

        let orientation = hat.get_orientation().unwrap();
        assert_eq!((orientation.pitch, orientation.roll, orientation.yaw), (1.0, 2.0, 3.0));

        hat.set_rotation(Rotation::Deg270, false).unwrap();
        match hat.set_imu_config(true, true, true).unwrap_err() {
            BridgeError::RuntimeFault { message, .. } => {
                assert!(message.starts_with("ValueError: IMU is not calibrated"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let mut events = Vec::new();
        assert_eq!(hat.get_events(Some(&mut events)).unwrap(), 2);
        assert_eq!(events[0].direction, JoystickDirection::Up);
        assert_eq!(events[1].direction, JoystickDirection::Push);
        assert_eq!(events[1].action, JoystickAction::Released);
        assert_eq!(hat.get_events(None).unwrap(), 0);

        let event = hat.wait_for_event(false).unwrap();
        assert_eq!(event.direction, JoystickDirection::Left);
        assert_eq!(event.action, JoystickAction::Held);

        hat.close().unwrap();
        assert!(!context.is_device_open());
        assert_eq!(unsafe { pyo3::ffi::Py_IsInitialized() }, 1);
    }

    #[test]
    fn test_reopen_after_finalize() {
        let (_guard, runtime) = ready_runtime();
        install_board();
        let context = Arc::new(RuntimeContext::with_config(runtime, board_config(true)));

        let hat = SenseHat::open(context.clone()).unwrap();
        hat.set_pixel(1, 1, Some(PixelColor::WHITE)).unwrap();
        hat.close().unwrap();
        assert_eq!(unsafe { pyo3::ffi::Py_IsInitialized() }, 0);

        context.runtime().initialize().unwrap();
        install_board();
        let hat = SenseHat::open(context.clone()).unwrap();
        assert_eq!(hat.get_pixel(1, 1).unwrap(), PixelColor::BLACK);
        let fault = context.runtime().with_lock(|session| {
            session.import_module("no_such_module_for_tests").unwrap_err()
        });
        assert_eq!(fault.kind, "ModuleNotFoundError");
        hat.close().unwrap();
    }
}
