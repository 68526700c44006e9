use super::{ResourceSet, TrialNamespace, Workload};
use crate::{
    config::BindMountConfig,
    errors::{ProvisionError, ReadinessError, TeardownError},
};
use async_trait::async_trait;
use nix::mount::{mount, umount, MsFlags};
use std::{fs, io, path::PathBuf, time::Duration};
use tracing::debug;

/// Creates `n` bind mounts, each from its own source directory onto its
/// own mount point. Exercises the kernel mount table, which is where the
/// scaling cost of "prepare n workspaces" shows up.
pub struct BindMount {
    base_dir: PathBuf,
}

impl BindMount {
    pub fn new(config: &BindMountConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
        }
    }
}

#[derive(Debug)]
struct MountPoint {
    source: PathBuf,
    target: PathBuf,
    mounted: bool,
}

pub struct MountSet {
    namespace: TrialNamespace,
    trial_dir: PathBuf,
    mounts: Vec<MountPoint>,
}

impl ResourceSet for MountSet {
    fn namespace(&self) -> &TrialNamespace {
        &self.namespace
    }

    fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

#[async_trait]
impl Workload for BindMount {
    type Resources = MountSet;

    fn label(&self) -> &'static str {
        "bind-mount"
    }

    fn size_field(&self) -> &'static str {
        "num_mounts"
    }

    fn new_resources(&self, namespace: TrialNamespace) -> MountSet {
        let trial_dir = self.base_dir.join(namespace.as_str());
        MountSet {
            namespace,
            trial_dir,
            mounts: vec![],
        }
    }

    async fn provision(&self, size: u32, resources: &mut MountSet) -> Result<(), ProvisionError> {
        fs::create_dir_all(&resources.trial_dir)
            .map_err(|e| ProvisionError::new(resources.trial_dir.display().to_string(), e))?;

        for i in 0..size {
            let member = resources.namespace.member(i);
            let source = resources.trial_dir.join(format!("{member}-src"));
            let target = resources.trial_dir.join(format!("{member}-mnt"));

            fs::create_dir(&source)
                .map_err(|e| ProvisionError::new(source.display().to_string(), e))?;
            fs::create_dir(&target)
                .map_err(|e| ProvisionError::new(target.display().to_string(), e))?;

            // track the directories before mounting so a failed mount
            // still gets its directories cleaned up
            resources.mounts.push(MountPoint {
                source: source.clone(),
                target: target.clone(),
                mounted: false,
            });

            mount(
                Some(&source),
                &target,
                None::<&str>,
                MsFlags::MS_BIND,
                None::<&str>,
            )
            .map_err(|e| ProvisionError::new(target.display().to_string(), e))?;

            resources
                .mounts
                .last_mut()
                .expect("mount point was just pushed")
                .mounted = true;
        }

        debug!("bind-mounted {} directories under {}", size, resources.namespace);
        Ok(())
    }

    /// mount(2) is synchronous: once it returns, the mount is usable.
    async fn await_ready(
        &self,
        _resources: &MountSet,
        _timeout: Duration,
    ) -> Result<(), ReadinessError> {
        Ok(())
    }

    async fn teardown(&self, resources: &mut MountSet) -> Result<(), TeardownError> {
        let mut residues = vec![];
        let mut remaining = vec![];

        for mut mp in resources.mounts.drain(..) {
            match remove_mount(&mut mp) {
                Ok(()) => {}
                Err(reason) => {
                    residues.push(format!("{} ({})", mp.target.display(), reason));
                    remaining.push(mp);
                }
            }
        }
        resources.mounts = remaining;

        // only remove the trial directory once nothing is mounted under
        // it, otherwise we would delete through a live bind mount
        if resources.mounts.is_empty() {
            if let Err(e) = remove_if_exists(fs::remove_dir_all(&resources.trial_dir)) {
                residues.push(format!("{} ({})", resources.trial_dir.display(), e));
            }
        }

        if residues.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { residues })
        }
    }
}

fn remove_mount(mp: &mut MountPoint) -> Result<(), String> {
    if mp.mounted {
        match umount(&mp.target) {
            // EINVAL: target is not a mount point, someone already
            // unmounted it; that is the state we want
            Ok(()) | Err(nix::errno::Errno::EINVAL) => mp.mounted = false,
            Err(e) => return Err(e.to_string()),
        }
    }
    remove_if_exists(fs::remove_dir(&mp.target)).map_err(|e| e.to_string())?;
    remove_if_exists(fs::remove_dir_all(&mp.source)).map_err(|e| e.to_string())?;
    Ok(())
}

fn remove_if_exists(res: io::Result<()>) -> io::Result<()> {
    match res {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
