// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use env_logger::Target;

use quic_recovery::congestion_control::simulator::SimulatorConfig;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Return the log target, a file opened in append mode if `log_file` is set,
/// otherwise `stderr`.
pub fn log_target(log_file: &Option<String>) -> Result<Target> {
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Target::Pipe(Box::new(file)))
        }
        None => Ok(Target::Stderr),
    }
}

/// Load a simulator config from a JSON file. Missing fields take their
/// default values.
pub fn load_simulator_config<P: AsRef<Path>>(path: P) -> Result<SimulatorConfig> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}
