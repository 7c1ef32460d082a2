//! 温度控制器：后台传感器监控 + 目标温度判定

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};
use serde::Deserialize;

use super::error::DeviceError;
use super::port::{ActuatorPort, SensorPort};
use crate::core::control::{device_ids, Channel};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TempControllerConfig {
    pub target_temp: f64,
    pub tolerance: f64,
    pub reading_interval_ms: u64,
    /// Monitoring gives up after this many failed reads in a row.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for TempControllerConfig {
    fn default() -> Self {
        Self {
            target_temp: 45.0,
            tolerance: 0.5,
            reading_interval_ms: 1000,
            max_consecutive_failures: None,
        }
    }
}

impl TempControllerConfig {
    pub fn reading_interval(&self) -> Duration {
        Duration::from_millis(self.reading_interval_ms)
    }
}

pub type ReadingCallback = Box<dyn FnMut(f64) + Send>;

/// 后台线程定期读取传感器，只写入最近一次成功读数
pub struct SensorMonitor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<Box<dyn SensorPort>>>,
    latest: Arc<Mutex<Option<f64>>>,
}

impl SensorMonitor {
    pub fn start(
        mut sensor: Box<dyn SensorPort>,
        interval: Duration,
        max_failures: Option<u32>,
        latest: Arc<Mutex<Option<f64>>>,
        mut callback: Option<ReadingCallback>,
    ) -> Result<Self, DeviceError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&latest);

        let handle = thread::Builder::new()
            .name("sensor-monitor".to_string())
            .spawn(move || {
                info!("🌡️ Sensor monitor started: {}", sensor.name());
                let mut failures = 0u32;
                loop {
                    match sensor.read() {
                        Ok(value) => {
                            failures = 0;
                            if let Ok(mut slot) = shared.lock() {
                                *slot = Some(value);
                            }
                            if let Some(cb) = callback.as_mut() {
                                cb(value);
                            }
                        }
                        Err(e) => {
                            failures += 1;
                            warn!("⚠️ Temperature read failed ({} in a row): {}", failures, e);
                            if max_failures.is_some_and(|max| failures >= max) {
                                error!("❌ Sensor monitor giving up after {} failures", failures);
                                break;
                            }
                        }
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                info!("🛑 Sensor monitor stopped");
                sensor
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            latest,
        })
    }

    pub fn latest(&self) -> Option<f64> {
        self.latest.lock().ok().and_then(|slot| *slot)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the thread and hands back the sensor.
    pub fn stop(mut self) -> Option<Box<dyn SensorPort>> {
        self.stop_tx.take();
        self.handle.take().and_then(|h| h.join().ok())
    }
}

impl Drop for SensorMonitor {
    fn drop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub struct TemperatureController {
    config: TempControllerConfig,
    target: f64,
    sensor: Option<Box<dyn SensorPort>>,
    monitor: Option<SensorMonitor>,
    latest: Arc<Mutex<Option<f64>>>,
    released: bool,
}

impl TemperatureController {
    pub fn new(config: TempControllerConfig, sensor: Box<dyn SensorPort>) -> Self {
        Self {
            target: config.target_temp,
            config,
            sensor: Some(sensor),
            monitor: None,
            latest: Arc::new(Mutex::new(None)),
            released: false,
        }
    }

    pub fn config(&self) -> &TempControllerConfig {
        &self.config
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target_temperature(&mut self, target: f64) {
        self.target = target;
        info!("🎯 Target temperature set to {:.1}°C", target);
    }

    pub fn start_monitoring(&mut self) -> Result<(), DeviceError> {
        self.start_monitoring_with(None)
    }

    /// `callback` runs on the monitor thread for each successful reading.
    pub fn start_monitoring_with(
        &mut self,
        callback: Option<ReadingCallback>,
    ) -> Result<(), DeviceError> {
        if self.released {
            return Err(DeviceError::Released(device_ids::TEMP_CONTROLLER.to_string()));
        }
        if self.monitor.is_some() {
            return Ok(());
        }
        let Some(sensor) = self.sensor.take() else {
            return Err(DeviceError::SensorRead("sensor unavailable".to_string()));
        };

        let monitor = SensorMonitor::start(
            sensor,
            self.config.reading_interval(),
            self.config.max_consecutive_failures,
            Arc::clone(&self.latest),
            callback,
        )?;
        self.monitor = Some(monitor);
        Ok(())
    }

    pub fn stop_monitoring(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            self.sensor = monitor.stop();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(|m| m.is_running())
    }

    pub fn last_reading(&self) -> Option<f64> {
        self.latest.lock().ok().and_then(|slot| *slot)
    }

    /// Synchronous read. While monitoring, returns the monitor's latest value.
    pub fn read_now(&mut self) -> Result<f64, DeviceError> {
        if let Some(sensor) = self.sensor.as_mut() {
            let value = sensor.read()?;
            if let Ok(mut slot) = self.latest.lock() {
                *slot = Some(value);
            }
            return Ok(value);
        }
        self.last_reading()
            .ok_or_else(|| DeviceError::SensorRead("no reading yet".to_string()))
    }

    pub fn is_within_target(&mut self) -> Result<bool, DeviceError> {
        let current = match self.last_reading() {
            Some(value) => value,
            None => self.read_now()?,
        };
        Ok((current - self.target).abs() <= self.config.tolerance)
    }

    /// Cooling power the AC should run at: 100 above the band, 0 below it,
    /// `None` inside the band or without a reading.
    pub fn cooling_demand(&self) -> Option<f64> {
        let current = self.last_reading()?;
        if current > self.target + self.config.tolerance {
            Some(100.0)
        } else if current < self.target - self.config.tolerance {
            Some(0.0)
        } else {
            None
        }
    }
}

impl ActuatorPort for TemperatureController {
    fn id(&self) -> &str {
        device_ids::TEMP_CONTROLLER
    }

    fn channel(&self) -> Channel {
        Channel::Temperature
    }

    /// Sets the target temperature.
    fn set_intensity(&mut self, value: f64) -> Result<(), DeviceError> {
        if self.released {
            return Err(DeviceError::Released(device_ids::TEMP_CONTROLLER.to_string()));
        }
        self.target = Channel::Temperature.clamp(value);
        Ok(())
    }

    fn start(&mut self, initial: Option<f64>) -> Result<(), DeviceError> {
        if let Some(target) = initial {
            self.set_intensity(target)?;
        }
        self.start_monitoring()
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.stop_monitoring();
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), DeviceError> {
        self.stop_monitoring();
        self.released = true;
        Ok(())
    }

    fn level(&self) -> Option<f64> {
        Some(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays fixed readings, then repeats the last one.
    struct ScriptedSensor {
        readings: VecDeque<Result<f64, ()>>,
        last: f64,
    }

    impl ScriptedSensor {
        fn boxed(readings: Vec<Result<f64, ()>>) -> Box<dyn SensorPort> {
            Box::new(Self {
                readings: readings.into(),
                last: 0.0,
            })
        }
    }

    impl SensorPort for ScriptedSensor {
        fn name(&self) -> &str {
            "scripted"
        }

        fn read(&mut self) -> Result<f64, DeviceError> {
            match self.readings.pop_front() {
                Some(Ok(v)) => {
                    self.last = v;
                    Ok(v)
                }
                Some(Err(())) => Err(DeviceError::SensorRead("scripted failure".to_string())),
                None => Ok(self.last),
            }
        }
    }

    fn fast_config() -> TempControllerConfig {
        TempControllerConfig {
            reading_interval_ms: 5,
            ..Default::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_cooling_demand_hysteresis() {
        let mut controller =
            TemperatureController::new(fast_config(), ScriptedSensor::boxed(vec![Ok(46.0)]));
        assert_eq!(controller.cooling_demand(), None);

        controller.read_now().unwrap();
        assert_eq!(controller.cooling_demand(), Some(100.0));

        controller.set_target_temperature(50.0);
        assert_eq!(controller.cooling_demand(), Some(0.0));

        controller.set_target_temperature(45.8);
        assert_eq!(controller.cooling_demand(), None);
        assert!(controller.is_within_target().unwrap());
    }

    #[test]
    fn test_monitor_keeps_last_good_reading() {
        let sensor = ScriptedSensor::boxed(vec![Ok(30.0), Err(()), Err(())]);
        let mut controller = TemperatureController::new(fast_config(), sensor);

        controller.start(Some(45.0)).unwrap();
        wait_for(|| controller.last_reading().is_some());
        thread::sleep(Duration::from_millis(20));

        assert_eq!(controller.last_reading(), Some(30.0));
        controller.stop().unwrap();
        assert!(!controller.is_monitoring());
    }

    #[test]
    fn test_monitor_circuit_breaker() {
        let config = TempControllerConfig {
            max_consecutive_failures: Some(2),
            ..fast_config()
        };
        let sensor = ScriptedSensor::boxed(vec![Err(()), Err(()), Ok(20.0)]);
        let mut controller = TemperatureController::new(config, sensor);

        controller.start_monitoring().unwrap();
        wait_for(|| !controller.is_monitoring());
        assert_eq!(controller.last_reading(), None);
    }

    #[test]
    fn test_callback_and_restart() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut controller =
            TemperatureController::new(fast_config(), ScriptedSensor::boxed(vec![Ok(41.5)]));

        controller
            .start_monitoring_with(Some(Box::new(move |v: f64| sink.lock().unwrap().push(v))))
            .unwrap();
        wait_for(|| !seen.lock().unwrap().is_empty());
        controller.stop_monitoring();

        assert_eq!(seen.lock().unwrap()[0], 41.5);
        // Sensor is handed back, so monitoring can resume.
        controller.start_monitoring().unwrap();
        controller.cleanup().unwrap();
        assert!(controller.set_intensity(40.0).is_err());
    }
}
