//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to a `external fun` declaration
//! in RustBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! The app owns the engine through an opaque `long` handle returned by
//! `nativeCreate` and released by `nativeDestroy`.

use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jdouble, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use log::{debug, error, LevelFilter};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::config::NavigatorConfig;
use crate::error::Result;
use crate::events::EventHandler;
use crate::geo::{distance_meters, Coordinate};
use crate::location::PlatformLocation;
use crate::model::{Destination, PositionFix, TravelMode};
use crate::navigator::Navigator;

/// Route the `log` facade to logcat. Safe to call more than once.
pub fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("campusnav"),
    );
}

/// Everything behind one app handle. Fields drop in order, so the
/// navigator is torn down before its runtime.
pub struct NativeEngine {
    navigator: Navigator,
    location: Arc<PlatformLocation>,
    runtime: Runtime,
}

impl NativeEngine {
    pub fn new(config_toml: Option<&str>) -> Result<Self> {
        let config = match config_toml {
            Some(toml) => NavigatorConfig::from_toml_str(toml)?,
            None => NavigatorConfig::default(),
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("campusnav")
            .enable_all()
            .build()?;
        let location = Arc::new(PlatformLocation::new());
        let navigator = Navigator::with_directions(config, location.clone())?;

        Ok(Self {
            navigator,
            location,
            runtime,
        })
    }

    pub fn push_location(&self, fix: PositionFix) {
        self.location.push(fix);
    }

    /// Blocks the calling thread until the route is in place or failed.
    pub fn start_navigation(&self, destination_json: &str, mode: &str) -> bool {
        let destination: Destination = match serde_json::from_str(destination_json) {
            Ok(d) => d,
            Err(e) => {
                error!("Invalid destination JSON: {e}");
                return false;
            }
        };
        let handler = EventHandler::new(|event| debug!("Navigation event: {event:?}"));
        self.runtime.block_on(self.navigator.start_navigation(
            destination,
            TravelMode::from_name(mode),
            Some(handler),
        ))
    }

    pub fn stop_navigation(&self) {
        self.navigator.stop_navigation();
    }

    pub fn state_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.navigator.get_navigation_state())?)
    }
}

/// Borrow the engine behind a handle.
///
/// # Safety
/// `handle` must be 0 or a value returned by `nativeCreate` that has not
/// been passed to `nativeDestroy`.
unsafe fn engine<'a>(handle: jlong) -> Option<&'a NativeEngine> {
    (handle as *const NativeEngine).as_ref()
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    if value.is_null() {
        return None;
    }
    match env.get_string(value) {
        Ok(s) => Some(s.into()),
        Err(e) => {
            error!("Failed to read Java string: {e}");
            None
        }
    }
}

/// Returns the rust-core library version.
/// Maps to: RustBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_version(
    env: JNIEnv,
    _class: JClass,
) -> jstring {
    let version = crate::VERSION;
    env.new_string(version)
        .expect("failed to create Java string")
        .into_raw()
}

/// Creates an engine and returns its handle, or 0 on failure.
/// Maps to: RustBridge.nativeCreate(configToml: String?) -> Long
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_nativeCreate(
    mut env: JNIEnv,
    _class: JClass,
    config_toml: JString,
) -> jlong {
    init_logging();
    let toml = read_string(&mut env, &config_toml);
    match NativeEngine::new(toml.as_deref()) {
        Ok(engine) => Box::into_raw(Box::new(engine)) as jlong,
        Err(e) => {
            error!("Failed to create navigation engine: {e}");
            0
        }
    }
}

/// Stops navigation and frees the engine.
/// Maps to: RustBridge.nativeDestroy(handle: Long)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_nativeDestroy(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle != 0 {
        // SAFETY: the app passes each handle from nativeCreate here exactly once
        drop(unsafe { Box::from_raw(handle as *mut NativeEngine) });
    }
}

/// Feeds a platform location fix. A NaN heading means unknown.
/// Maps to: RustBridge.nativePushLocation(handle, lat, lng, heading, accuracy, timestampMs)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_nativePushLocation(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    lat: jdouble,
    lng: jdouble,
    heading: jdouble,
    accuracy: jdouble,
    timestamp_ms: jlong,
) {
    // SAFETY: handle comes from nativeCreate
    let Some(engine) = (unsafe { engine(handle) }) else {
        return;
    };
    engine.push_location(PositionFix {
        lat,
        lng,
        heading: heading.is_finite().then_some(heading),
        accuracy,
        timestamp_ms: timestamp_ms.max(0) as u64,
    });
}

/// Maps to: RustBridge.nativeStartNavigation(handle, destinationJson, mode) -> Boolean
/// Must not be called from the main thread.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_nativeStartNavigation(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    destination_json: JString,
    mode: JString,
) -> jboolean {
    // SAFETY: handle comes from nativeCreate
    let Some(engine) = (unsafe { engine(handle) }) else {
        return JNI_FALSE;
    };
    let Some(destination) = read_string(&mut env, &destination_json) else {
        return JNI_FALSE;
    };
    let mode = read_string(&mut env, &mode).unwrap_or_default();

    if engine.start_navigation(&destination, &mode) {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// Maps to: RustBridge.nativeStopNavigation(handle)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_nativeStopNavigation(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    // SAFETY: handle comes from nativeCreate
    if let Some(engine) = unsafe { engine(handle) } {
        engine.stop_navigation();
    }
}

/// Current navigation state as JSON, or null on failure.
/// Maps to: RustBridge.nativeStateJson(handle) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_nativeStateJson(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    // SAFETY: handle comes from nativeCreate
    let Some(engine) = (unsafe { engine(handle) }) else {
        return std::ptr::null_mut();
    };
    let json = match engine.state_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize navigation state: {e}");
            return std::ptr::null_mut();
        }
    };
    match env.new_string(json) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            error!("Failed to create Java string: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Great-circle distance in meters, for list sorting in the UI.
/// Maps to: RustBridge.nativeDistance(lat1, lng1, lat2, lng2) -> Double
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_campusnav_app_RustBridge_nativeDistance(
    _env: JNIEnv,
    _class: JClass,
    lat1: jdouble,
    lng1: jdouble,
    lat2: jdouble,
    lng2: jdouble,
) -> jdouble {
    distance_meters(&Coordinate::new(lat1, lng1), &Coordinate::new(lat2, lng2))
}
