use crate::core::error::{DetectorError, Result};
use candle_core::Device;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 计算设备选择，配置中写作 "auto" / "cpu" / "cuda:0" / "metal:0"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceChoice {
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl FromStr for DeviceChoice {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        let ordinal = |rest: Option<&str>| -> Result<usize> {
            match rest {
                None | Some("") => Ok(0),
                Some(n) => n
                    .parse()
                    .map_err(|_| DetectorError::Configuration(format!("bad device ordinal: {}", n))),
            }
        };
        let (kind, rest) = match s.split_once(':') {
            Some((kind, rest)) => (kind, Some(rest)),
            None => (s.as_str(), None),
        };
        match kind {
            "auto" => Ok(DeviceChoice::Auto),
            "cpu" => Ok(DeviceChoice::Cpu),
            "cuda" | "gpu" => Ok(DeviceChoice::Cuda(ordinal(rest)?)),
            "metal" | "mps" => Ok(DeviceChoice::Metal(ordinal(rest)?)),
            other => Err(DetectorError::Configuration(format!(
                "unknown device: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DeviceChoice {
    type Error = DetectorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceChoice> for String {
    fn from(value: DeviceChoice) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceChoice::Auto => write!(f, "auto"),
            DeviceChoice::Cpu => write!(f, "cpu"),
            DeviceChoice::Cuda(i) => write!(f, "cuda:{}", i),
            DeviceChoice::Metal(i) => write!(f, "metal:{}", i),
        }
    }
}

/// Resolves the choice once; the returned device is fixed for the model's lifetime.
pub fn select_device(choice: DeviceChoice) -> Result<Device> {
    let device = match choice {
        DeviceChoice::Cpu => Device::Cpu,
        DeviceChoice::Cuda(ordinal) => Device::new_cuda(ordinal)?,
        DeviceChoice::Metal(ordinal) => Device::new_metal(ordinal)?,
        DeviceChoice::Auto => {
            #[cfg(feature = "metal")]
            let device = Device::new_metal(0).unwrap_or(Device::Cpu);
            #[cfg(not(feature = "metal"))]
            let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
            device
        }
    };
    info!("🖥️ Using device: {:?}", device);
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_choice() {
        assert_eq!("auto".parse::<DeviceChoice>().unwrap(), DeviceChoice::Auto);
        assert_eq!("CPU".parse::<DeviceChoice>().unwrap(), DeviceChoice::Cpu);
        assert_eq!("cuda".parse::<DeviceChoice>().unwrap(), DeviceChoice::Cuda(0));
        assert_eq!("cuda:1".parse::<DeviceChoice>().unwrap(), DeviceChoice::Cuda(1));
        assert_eq!("metal:0".parse::<DeviceChoice>().unwrap(), DeviceChoice::Metal(0));
        assert!("tpu".parse::<DeviceChoice>().is_err());
        assert!("cuda:x".parse::<DeviceChoice>().is_err());
    }

    #[test]
    fn test_device_choice_serde_as_string() {
        let json = serde_json::to_string(&DeviceChoice::Cuda(2)).unwrap();
        assert_eq!(json, "\"cuda:2\"");
        let back: DeviceChoice = serde_json::from_str("\"cpu\"").unwrap();
        assert_eq!(back, DeviceChoice::Cpu);
    }

    #[test]
    fn test_cpu_selection() {
        assert!(select_device(DeviceChoice::Cpu).unwrap().is_cpu());
    }
}
