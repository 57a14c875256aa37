use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::debug;

use crate::fetcher::{Handle, Job};
use crate::model::{short_address, Profile};
use crate::source::FeedError;

// Requested is marked before the job is queued, so an address is fetched once.
pub struct ProfileCache {
    jobs: Handle,
    profiles: HashMap<String, Profile>,
    requested: HashSet<String>,
    in_flight: HashSet<String>,
}

impl ProfileCache {
    pub fn new(jobs: Handle) -> Self {
        Self {
            jobs,
            profiles: HashMap::new(),
            requested: HashSet::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn ensure<'a, I>(&mut self, addresses: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut queued = 0;
        for address in addresses {
            let address = address.trim();
            if address.is_empty() || self.requested.contains(address) {
                continue;
            }
            self.requested.insert(address.to_string());
            if self.jobs.submit(Job::Profile {
                address: address.to_string(),
            }) {
                self.in_flight.insert(address.to_string());
                queued += 1;
            } else {
                self.requested.remove(address);
            }
        }
        queued
    }

    pub fn resolve(&mut self, address: &str, result: Result<Profile>) -> bool {
        if !self.in_flight.remove(address) {
            return false;
        }
        match result {
            Ok(profile) if !profile.is_empty() => {
                self.profiles.insert(address.to_string(), profile);
                true
            }
            Ok(_) => false,
            Err(err) => {
                let err = FeedError::Hydration {
                    address: address.to_string(),
                    message: format!("{err:#}"),
                };
                debug!(%err, "profile left unresolved");
                false
            }
        }
    }

    pub fn invalidate(&mut self, address: &str) {
        self.profiles.remove(address);
        self.requested.remove(address);
        self.in_flight.remove(address);
    }

    pub fn get(&self, address: &str) -> Option<&Profile> {
        self.profiles.get(address)
    }

    pub fn display_name(&self, address: &str) -> String {
        self.profiles
            .get(address)
            .and_then(|profile| profile.display_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| short_address(address))
    }

    pub fn is_requested(&self, address: &str) -> bool {
        self.requested.contains(address)
    }

    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }
}
