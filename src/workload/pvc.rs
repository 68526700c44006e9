use super::{ResourceSet, TrialNamespace, Workload};
use crate::{
    config::PvcConfig,
    errors::{ProvisionError, ReadinessError, TeardownError},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

const TRIAL_LABEL: &str = "provbench/trial";
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Creates `n` statically-bound PV/PVC pairs through the cluster API.
/// Each PV is a hostPath volume pre-bound to its claim (`volumeName` +
/// empty storage class), so readiness does not depend on a dynamic
/// provisioner being installed.
pub struct Pvc {
    namespace: String,
    capacity: String,
    host_path_root: PathBuf,
    kubectl_bin: String,
}

impl Pvc {
    pub fn new(config: &PvcConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            capacity: config.capacity.clone(),
            host_path_root: config.host_path_root.clone(),
            kubectl_bin: config.kubectl_bin.clone(),
        }
    }

    fn pv_manifest(&self, trial: &TrialNamespace, name: &str, claim: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {
                "name": name,
                "labels": { "provbench/trial": trial.as_str() },
            },
            "spec": {
                "capacity": { "storage": self.capacity },
                "accessModes": ["ReadWriteOnce"],
                "persistentVolumeReclaimPolicy": "Retain",
                "storageClassName": "",
                "hostPath": { "path": self.host_path_root.join(name) },
                "claimRef": {
                    "namespace": self.namespace,
                    "name": claim,
                },
            },
        })
    }

    fn pvc_manifest(&self, trial: &TrialNamespace, name: &str, volume: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": name,
                "namespace": self.namespace,
                "labels": { "provbench/trial": trial.as_str() },
            },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "storageClassName": "",
                "volumeName": volume,
                "resources": { "requests": { "storage": self.capacity } },
            },
        })
    }

    async fn bound_claims(&self, trial: &TrialNamespace) -> Result<usize, String> {
        let selector = format!("{TRIAL_LABEL}={trial}");
        let output = self
            .kubectl(
                &[
                    "get",
                    "pvc",
                    "-n",
                    self.namespace.as_str(),
                    "-l",
                    selector.as_str(),
                    "-o",
                    "json",
                ],
                None,
            )
            .await?;

        let listing: Value = serde_json::from_slice(&output).map_err(|e| e.to_string())?;
        let bound = listing["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item["status"]["phase"] == "Bound")
                    .count()
            })
            .unwrap_or(0);
        Ok(bound)
    }
}

pub struct PvcSet {
    namespace: TrialNamespace,
    pvcs: Vec<String>,
    pvs: Vec<String>,
}

impl ResourceSet for PvcSet {
    fn namespace(&self) -> &TrialNamespace {
        &self.namespace
    }

    fn is_empty(&self) -> bool {
        self.pvcs.is_empty() && self.pvs.is_empty()
    }
}

#[async_trait]
impl Workload for Pvc {
    type Resources = PvcSet;

    fn label(&self) -> &'static str {
        "pvc"
    }

    fn size_field(&self) -> &'static str {
        "num_pvcs"
    }

    fn new_resources(&self, namespace: TrialNamespace) -> PvcSet {
        PvcSet {
            namespace,
            pvcs: vec![],
            pvs: vec![],
        }
    }

    async fn provision(&self, size: u32, resources: &mut PvcSet) -> Result<(), ProvisionError> {
        let mut items = vec![];
        for i in 0..size {
            let pv_name = format!("{}-pv", resources.namespace.member(i));
            let pvc_name = format!("{}-pvc", resources.namespace.member(i));
            items.push(self.pv_manifest(&resources.namespace, &pv_name, &pvc_name));
            items.push(self.pvc_manifest(&resources.namespace, &pvc_name, &pv_name));
            // track names before the apply so a partial apply is still
            // covered by teardown
            resources.pvs.push(pv_name);
            resources.pvcs.push(pvc_name);
        }

        let manifest = serde_json::to_vec(&json!({
            "apiVersion": "v1",
            "kind": "List",
            "items": items,
        }))
        .map_err(|e| ProvisionError::new(resources.namespace.as_str(), e))?;

        self.kubectl(&["apply", "-f", "-"], Some(&manifest))
            .await
            .map_err(|reason| ProvisionError::new(resources.namespace.as_str(), reason))?;

        debug!("applied {} PV/PVC pairs for {}", size, resources.namespace);
        Ok(())
    }

    async fn await_ready(
        &self,
        resources: &PvcSet,
        timeout: Duration,
    ) -> Result<(), ReadinessError> {
        let total = resources.pvcs.len();
        let deadline = Instant::now() + timeout;
        let mut last_error = None;

        loop {
            let bound = match self.bound_claims(&resources.namespace).await {
                Ok(bound) => bound,
                Err(reason) => {
                    warn!("readiness poll failed: {reason}");
                    last_error = Some(reason);
                    0
                }
            };
            if bound >= total {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ReadinessError {
                    pending: total - bound,
                    total,
                    timeout,
                    detail: last_error,
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn teardown(&self, resources: &mut PvcSet) -> Result<(), TeardownError> {
        let mut residues = vec![];

        let mut remaining_pvcs = vec![];
        for pvc in resources.pvcs.drain(..) {
            let args = [
                "delete",
                "pvc",
                pvc.as_str(),
                "-n",
                self.namespace.as_str(),
                "--ignore-not-found",
            ];
            if let Err(reason) = self.kubectl(&args, None).await {
                residues.push(format!("pvc/{pvc} ({reason})"));
                remaining_pvcs.push(pvc);
            }
        }
        resources.pvcs = remaining_pvcs;

        let mut remaining_pvs = vec![];
        for pv in resources.pvs.drain(..) {
            let args = ["delete", "pv", pv.as_str(), "--ignore-not-found"];
            if let Err(reason) = self.kubectl(&args, None).await {
                residues.push(format!("pv/{pv} ({reason})"));
                remaining_pvs.push(pv);
            }
        }
        resources.pvs = remaining_pvs;

        if residues.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { residues })
        }
    }
}

impl Pvc {
    /// Runs the configured kubectl binary and returns its stdout, or the
    /// trimmed stderr on a non-zero exit.
    async fn kubectl(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<Vec<u8>, String> {
        let mut command = Command::new(&self.kubectl_bin);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to run {}: {e}", self.kubectl_bin))?;

        if let Some(bytes) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                handle
                    .write_all(bytes)
                    .await
                    .map_err(|e| format!("failed to write kubectl stdin: {e}"))?;
                // close stdin so kubectl sees EOF
                drop(handle);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("kubectl did not exit cleanly: {e}"))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}
