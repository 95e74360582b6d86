use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

/// Looks up an input device by name, falling back to the system default.
pub fn input_device(name: Option<&str>) -> anyhow::Result<Device> {
    let host = cpal::default_host();
    tracing::debug!("audio host: {:?}", host.id());
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("no default input device")),
        Some(target) => host
            .input_devices()?
            .find(|device| device.name().is_ok_and(|n| n == target))
            .ok_or_else(|| anyhow::anyhow!("input device {target:?} not found")),
    }
}

/// Looks up an output device by name, falling back to the system default.
pub fn output_device(name: Option<&str>) -> anyhow::Result<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device")),
        Some(target) => host
            .output_devices()?
            .find(|device| device.name().is_ok_and(|n| n == target))
            .ok_or_else(|| anyhow::anyhow!("output device {target:?} not found")),
    }
}

fn describe(device: &Device, default_name: Option<&str>) -> String {
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let mut line = match device.default_input_config().or(device.default_output_config()) {
        Ok(config) => format!(
            " * {}({}ch, {}hz)",
            name,
            config.channels(),
            config.sample_rate().0
        ),
        Err(_) => format!(" * {name}"),
    };
    if default_name == Some(name.as_str()) {
        line.push_str(" [default]");
    }
    line
}

/// One line per input device, for the `--list-devices` flag.
pub fn list_inputs() -> anyhow::Result<String> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let lines: Vec<String> = host
        .input_devices()?
        .map(|device| describe(&device, default_name.as_deref()))
        .collect();
    Ok(lines.join("\n"))
}

/// One line per output device, for the `--list-devices` flag.
pub fn list_outputs() -> anyhow::Result<String> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let lines: Vec<String> = host
        .output_devices()?
        .map(|device| describe(&device, default_name.as_deref()))
        .collect();
    Ok(lines.join("\n"))
}
