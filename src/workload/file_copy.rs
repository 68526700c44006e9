use super::{ResourceSet, TrialNamespace, Workload};
use crate::{
    config::FileCopyConfig,
    errors::{ProvisionError, ReadinessError, TeardownError},
};
use async_trait::async_trait;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};
use tracing::debug;

const MEGABYTE: usize = 1024 * 1024;

/// Copies `size` megabytes of source material into a fresh workspace
/// directory. The source file is built once per size in `prepare` so the
/// measured unit is only the copy itself.
pub struct FileCopy {
    base_dir: PathBuf,
}

impl FileCopy {
    pub fn new(config: &FileCopyConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
        }
    }

    fn source_path(&self, size: u32) -> PathBuf {
        self.base_dir.join("sources").join(format!("src-{size}mb.dat"))
    }
}

pub struct CopySet {
    namespace: TrialNamespace,
    trial_dir: PathBuf,
    copies: Vec<PathBuf>,
}

impl ResourceSet for CopySet {
    fn namespace(&self) -> &TrialNamespace {
        &self.namespace
    }

    fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }
}

#[async_trait]
impl Workload for FileCopy {
    type Resources = CopySet;

    fn label(&self) -> &'static str {
        "file-copy"
    }

    fn size_field(&self) -> &'static str {
        "size_mb"
    }

    fn new_resources(&self, namespace: TrialNamespace) -> CopySet {
        let trial_dir = self.base_dir.join(namespace.as_str());
        CopySet {
            namespace,
            trial_dir,
            copies: vec![],
        }
    }

    async fn prepare(&self, size: u32) -> Result<(), ProvisionError> {
        let source = self.source_path(size);
        if source.exists() {
            return Ok(());
        }
        let into_err = |e: io::Error| ProvisionError::new(source.display().to_string(), e);

        fs::create_dir_all(source.parent().expect("source path has a parent")).map_err(into_err)?;
        let mut file = File::create(&source).map_err(into_err)?;
        let chunk = patterned_chunk();
        for _ in 0..size {
            file.write_all(&chunk).map_err(into_err)?;
        }
        file.sync_all().map_err(into_err)?;

        debug!("built {size} MB copy source at {}", source.display());
        Ok(())
    }

    async fn provision(&self, size: u32, resources: &mut CopySet) -> Result<(), ProvisionError> {
        let source = self.source_path(size);
        let target = resources.trial_dir.join("copy.dat");

        fs::create_dir_all(&resources.trial_dir)
            .map_err(|e| ProvisionError::new(resources.trial_dir.display().to_string(), e))?;
        resources.copies.push(target.clone());

        fs::copy(&source, &target)
            .map_err(|e| ProvisionError::new(target.display().to_string(), e))?;

        // flush writeback so the measured unit includes the actual I/O,
        // not just a page-cache write
        OpenOptions::new()
            .write(true)
            .open(&target)
            .and_then(|f| f.sync_all())
            .map_err(|e| ProvisionError::new(target.display().to_string(), e))?;

        Ok(())
    }

    /// A synced copy is usable the moment provisioning returns.
    async fn await_ready(
        &self,
        _resources: &CopySet,
        _timeout: Duration,
    ) -> Result<(), ReadinessError> {
        Ok(())
    }

    async fn teardown(&self, resources: &mut CopySet) -> Result<(), TeardownError> {
        let mut residues = vec![];
        let mut remaining = vec![];

        for copy in resources.copies.drain(..) {
            match fs::remove_file(&copy) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    residues.push(format!("{} ({})", copy.display(), e));
                    remaining.push(copy);
                }
            }
        }
        resources.copies = remaining;

        if resources.copies.is_empty() {
            if let Err(e) = fs::remove_dir_all(&resources.trial_dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    residues.push(format!("{} ({})", resources.trial_dir.display(), e));
                }
            }
        }

        if residues.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { residues })
        }
    }
}

/// 1 MiB of non-constant bytes, so filesystems with inline compression
/// cannot shortcut the copy.
fn patterned_chunk() -> Vec<u8> {
    let mut chunk = vec![0u8; MEGABYTE];
    let mut state = 0x2545f491u32;
    for byte in chunk.iter_mut() {
        // xorshift keeps this cheap and dependency-free
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        *byte = state as u8;
    }
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(dir: &std::path::Path) -> FileCopy {
        FileCopy::new(&FileCopyConfig {
            base_dir: dir.to_path_buf(),
        })
    }

    #[tokio::test]
    async fn provisions_and_tears_down_a_copy() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let fc = workload(tmp.path());
        let mut resources = fc.new_resources(TrialNamespace::generate(fc.label()));

        fc.prepare(2).await?;
        assert_eq!(fs::metadata(fc.source_path(2))?.len(), 2 * MEGABYTE as u64);

        fc.provision(2, &mut resources).await?;
        fc.await_ready(&resources, Duration::from_secs(1)).await?;
        let copy = resources.copies.first().expect("one copy tracked");
        assert_eq!(fs::metadata(copy)?.len(), 2 * MEGABYTE as u64);

        fc.teardown(&mut resources).await?;
        assert!(resources.is_empty());
        assert!(!resources.trial_dir.exists());

        // second teardown is a no-op, not an error
        fc.teardown(&mut resources).await?;
        Ok(())
    }

    #[tokio::test]
    async fn prepare_reuses_an_existing_source() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let fc = workload(tmp.path());

        fc.prepare(1).await?;
        let first = fs::metadata(fc.source_path(1))?.modified()?;
        fc.prepare(1).await?;
        let second = fs::metadata(fc.source_path(1))?.modified()?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn provision_fails_without_source_but_stays_cleanable() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let fc = workload(tmp.path());
        let mut resources = fc.new_resources(TrialNamespace::generate(fc.label()));

        // no prepare: the copy has nothing to read from
        let result = fc.provision(3, &mut resources).await;
        assert!(result.is_err());

        fc.teardown(&mut resources).await?;
        assert!(resources.is_empty());
        Ok(())
    }
}
