//! Indicator hardware drivers

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{AlertConfig, AlertError};

/// Output lines of the driver indicator
pub trait IndicatorDriver: Send {
    fn set_leds(&mut self, red: bool, yellow: bool, green: bool) -> Result<(), AlertError>;

    fn set_buzzer(&mut self, on: bool) -> Result<(), AlertError>;

    /// Drive every line low and give the lines back to the system
    fn release(&mut self) -> Result<(), AlertError>;
}

struct GpioLine {
    pin: u32,
    value: PathBuf,
}

/// Four discrete output lines through the Linux sysfs GPIO interface
pub struct SysfsGpioDriver {
    root: PathBuf,
    buzzer: GpioLine,
    red: GpioLine,
    yellow: GpioLine,
    green: GpioLine,
    released: bool,
}

impl SysfsGpioDriver {
    /// Export and configure the pins named in `config` as outputs, all low
    pub fn open(config: &AlertConfig) -> Result<Self, AlertError> {
        let root = config.gpio_root.clone();
        if !root.join("export").exists() {
            return Err(AlertError::Hardware(format!(
                "GPIO interface not found at {}",
                root.display()
            )));
        }

        let mut driver = Self {
            buzzer: export_output(&root, config.buzzer_pin)?,
            red: export_output(&root, config.red_pin)?,
            yellow: export_output(&root, config.yellow_pin)?,
            green: export_output(&root, config.green_pin)?,
            root,
            released: false,
        };
        driver.set_leds(false, false, false)?;
        driver.set_buzzer(false)?;

        info!(
            "GPIO indicator ready (buzzer={}, red={}, yellow={}, green={})",
            config.buzzer_pin, config.red_pin, config.yellow_pin, config.green_pin
        );
        Ok(driver)
    }

    fn lines(&self) -> [&GpioLine; 4] {
        [&self.buzzer, &self.red, &self.yellow, &self.green]
    }
}

fn export_output(root: &Path, pin: u32) -> Result<GpioLine, AlertError> {
    let dir = root.join(format!("gpio{}", pin));
    if !dir.exists() {
        fs::write(root.join("export"), pin.to_string())?;
        debug!("Exported GPIO {}", pin);
    }
    fs::write(dir.join("direction"), "out")?;
    Ok(GpioLine {
        pin,
        value: dir.join("value"),
    })
}

fn write_line(line: &GpioLine, high: bool) -> Result<(), AlertError> {
    fs::write(&line.value, if high { "1" } else { "0" })
        .map_err(|e| AlertError::Hardware(format!("GPIO {}: {}", line.pin, e)))
}

impl IndicatorDriver for SysfsGpioDriver {
    fn set_leds(&mut self, red: bool, yellow: bool, green: bool) -> Result<(), AlertError> {
        write_line(&self.red, red)?;
        write_line(&self.yellow, yellow)?;
        write_line(&self.green, green)
    }

    fn set_buzzer(&mut self, on: bool) -> Result<(), AlertError> {
        write_line(&self.buzzer, on)
    }

    fn release(&mut self) -> Result<(), AlertError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut first_error = None;
        for line in self.lines() {
            let result = write_line(line, false).and_then(|_| {
                fs::write(self.root.join("unexport"), line.pin.to_string()).map_err(AlertError::from)
            });
            if let Err(e) = result {
                warn!("Failed to release GPIO {}: {}", line.pin, e);
                first_error.get_or_insert(e);
            }
        }
        info!("GPIO indicator released");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for SysfsGpioDriver {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("gpio-test-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("export"), "").unwrap();
        fs::write(root.join("unexport"), "").unwrap();
        for pin in [17, 22, 27, 24] {
            fs::create_dir_all(root.join(format!("gpio{}", pin))).unwrap();
        }
        root
    }

    fn read(root: &Path, pin: u32, file: &str) -> String {
        fs::read_to_string(root.join(format!("gpio{}", pin)).join(file)).unwrap()
    }

    fn config(root: &Path) -> AlertConfig {
        AlertConfig {
            enabled: true,
            gpio_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_configures_outputs_low() {
        let root = fake_sysfs("open");
        let _driver = SysfsGpioDriver::open(&config(&root)).unwrap();

        for pin in [17, 22, 27, 24] {
            assert_eq!(read(&root, pin, "direction"), "out");
            assert_eq!(read(&root, pin, "value"), "0");
        }
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_writes_and_release() {
        let root = fake_sysfs("write");
        let mut driver = SysfsGpioDriver::open(&config(&root)).unwrap();

        driver.set_leds(true, false, false).unwrap();
        driver.set_buzzer(true).unwrap();
        assert_eq!(read(&root, 22, "value"), "1");
        assert_eq!(read(&root, 27, "value"), "0");
        assert_eq!(read(&root, 17, "value"), "1");

        driver.release().unwrap();
        assert_eq!(read(&root, 22, "value"), "0");
        assert_eq!(read(&root, 17, "value"), "0");
        // Second release is a no-op
        driver.release().unwrap();
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_interface() {
        let root = std::env::temp_dir().join(format!("gpio-test-missing-{}", std::process::id()));
        assert!(matches!(
            SysfsGpioDriver::open(&config(&root)),
            Err(AlertError::Hardware(_))
        ));
    }
}
