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

//! Rotation of crypto server configs.
//!
//! A server keeps several configs. Each becomes eligible as the primary
//! config at its primary time, and among configs sharing a primary time the
//! lowest priority value wins. The server promotes the next config once its
//! primary time is reached.

use std::fmt;

use bytes::Bytes;
use log::*;
use ring::digest;
use rustc_hash::FxHashMap;

use crate::Error;
use crate::Result;

/// Length of a server config id.
pub const SERVER_CONFIG_ID_LEN: usize = 16;

/// Server config id, a truncated SHA-256 of the serialized config.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerConfigId([u8; SERVER_CONFIG_ID_LEN]);

impl ServerConfigId {
    pub fn from_serialized(serialized: &[u8]) -> Self {
        let hash = digest::digest(&digest::SHA256, serialized);
        let mut id = [0; SERVER_CONFIG_ID_LEN];
        id.copy_from_slice(&hash.as_ref()[..SERVER_CONFIG_ID_LEN]);
        ServerConfigId(id)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ServerConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ServerConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A crypto server config.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub id: ServerConfigId,

    pub serialized: Bytes,

    /// Unix time in seconds from which the config may be primary.
    pub primary_time: u64,

    /// Lower values are preferred among configs with the same primary time.
    pub priority: u64,

    pub is_primary: bool,
}

/// Set of server configs with a primary config chosen by primary time.
#[derive(Default)]
pub struct ServerConfigRotation {
    configs: FxHashMap<ServerConfigId, ServerConfig>,

    primary_config: Option<ServerConfigId>,

    /// Time at which the next config becomes primary. None if no config is
    /// waiting for promotion.
    next_config_promotion_time: Option<u64>,

    /// Called whenever a new primary config is selected.
    primary_config_changed: Option<Box<dyn FnMut(&ServerConfigId)>>,
}

impl ServerConfigRotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_primary_config_changed_callback(
        &mut self,
        callback: Box<dyn FnMut(&ServerConfigId)>,
    ) {
        self.primary_config_changed = Some(callback);
    }

    /// Add a config and reselect the primary config as of `now`.
    pub fn add_config(
        &mut self,
        serialized: Bytes,
        primary_time: u64,
        priority: u64,
        now: u64,
    ) -> Result<ServerConfigId> {
        let id = ServerConfigId::from_serialized(&serialized);
        if self.configs.contains_key(&id) {
            error!("server config {} already exists", id);
            return Err(Error::DuplicateConfig(id.to_string()));
        }

        self.configs.insert(
            id,
            ServerConfig {
                id,
                serialized,
                primary_time,
                priority,
                is_primary: false,
            },
        );
        self.select_new_primary_config(now);
        Ok(id)
    }

    /// Remove a config and reselect the primary config as of `now`.
    pub fn remove_config(&mut self, id: &ServerConfigId, now: u64) -> Result<()> {
        if self.configs.remove(id).is_none() {
            error!("server config {} does not exist", id);
            return Err(Error::UnknownConfig(id.to_string()));
        }

        if self.primary_config.as_ref() == Some(id) {
            self.primary_config = None;
        }
        self.select_new_primary_config(now);
        Ok(())
    }

    pub fn config(&self, id: &ServerConfigId) -> Option<&ServerConfig> {
        self.configs.get(id)
    }

    pub fn primary_config(&self) -> Option<&ServerConfig> {
        self.primary_config.as_ref().and_then(|id| self.configs.get(id))
    }

    pub fn next_config_promotion_time(&self) -> Option<u64> {
        self.next_config_promotion_time
    }

    /// Reselect the primary config once the next promotion time is reached.
    /// Return whether a reselection took place.
    pub fn maybe_promote(&mut self, now: u64) -> bool {
        match self.next_config_promotion_time {
            Some(t) if t <= now => {
                self.select_new_primary_config(now);
                true
            }
            _ => false,
        }
    }

    /// Make the most recent config whose primary time has passed the primary
    /// config. If every config is in the future, the earliest one is used.
    pub fn select_new_primary_config(&mut self, now: u64) {
        let mut configs: Vec<&ServerConfig> = self.configs.values().collect();
        if configs.is_empty() {
            self.primary_config = None;
            self.next_config_promotion_time = None;
            return;
        }
        configs.sort_by_key(|c| (c.primary_time, c.priority, c.id));

        let mut best = configs[0];
        let mut next_promotion = None;
        for (i, config) in configs.iter().copied().enumerate() {
            if config.primary_time <= now {
                if config.primary_time > best.primary_time {
                    best = config;
                }
                continue;
            }

            // The first config in the future, the previous one is primary.
            next_promotion = if i == 0 {
                configs.get(1).map(|c| c.primary_time)
            } else {
                Some(config.primary_time)
            };
            break;
        }

        let new_primary = best.id;
        self.next_config_promotion_time = next_promotion;
        if self.primary_config == Some(new_primary) {
            return;
        }

        if let Some(old) = self.primary_config.and_then(|id| self.configs.get_mut(&id)) {
            old.is_primary = false;
        }
        if let Some(config) = self.configs.get_mut(&new_primary) {
            config.is_primary = true;
        }
        self.primary_config = Some(new_primary);
        debug!(
            "now={} new primary server config {} next promotion {:?}",
            now, new_primary, next_promotion
        );

        if let Some(callback) = self.primary_config_changed.as_mut() {
            callback(&new_primary);
        }
    }
}

impl fmt::Debug for ServerConfigRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configs={}", self.configs.len())?;
        write!(f, " primary={:?}", self.primary_config)?;
        write!(f, " next_promotion={:?}", self.next_config_promotion_time)?;

        Ok(())
    }
}
