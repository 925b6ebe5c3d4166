use crate::command::RemoteCommand;
use crate::error::FileOpError;
use crate::listing::{normalize_listing, EntryKind, RemoteFileEntry};
use crate::path::{join_remote, parent_of, validate_leaf, validate_path};
use crate::staging::StagingArea;
use crate::transport::{CommandOutput, RemoteTransport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

pub struct OpContext<'a> {
    pub transport: &'a dyn RemoteTransport,
    pub staging: &'a StagingArea,
    pub require_atomic_move: bool,
}

impl OpContext<'_> {
    async fn run(
        &self,
        op: &'static str,
        command: RemoteCommand,
    ) -> Result<CommandOutput, FileOpError> {
        debug!(command = %command, "remote command");
        self.transport
            .exec(&command)
            .await
            .map_err(|e| e.into_op_error(op))
    }
}

#[async_trait]
pub trait Operation: Send {
    type Output: Serialize + Send;
    const NAME: &'static str;

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError>;
}

#[derive(Clone, Debug)]
pub struct ListDirectory {
    pub path: String,
}

#[async_trait]
impl Operation for ListDirectory {
    type Output = Vec<RemoteFileEntry>;
    const NAME: &'static str = "list directory";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.path)?;
        let records = ctx
            .transport
            .read_dir(&self.path)
            .await
            .map_err(|e| e.into_op_error(Self::NAME))?;
        normalize_listing(&self.path, records)
    }
}

#[derive(Clone, Debug)]
pub struct CreateDirectory {
    pub parent: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreatedEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[async_trait]
impl Operation for CreateDirectory {
    type Output = CreatedEntry;
    const NAME: &'static str = "create directory";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_leaf(&self.name)?;
        let path = join_remote(&self.parent, &self.name);
        ctx.transport
            .create_dir(&path)
            .await
            .map_err(|e| e.into_op_error(Self::NAME))?;
        Ok(CreatedEntry {
            name: self.name,
            path,
            kind: EntryKind::Directory,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ReadFile {
    pub path: String,
}

#[async_trait]
impl Operation for ReadFile {
    type Output = String;
    const NAME: &'static str = "read file";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.path)?;
        let buffer = ctx.staging.buffer().map_err(FileOpError::LocalResource)?;
        let mut sink = buffer.writer().map_err(FileOpError::LocalResource)?;
        ctx.transport
            .download(&self.path, &mut sink)
            .await
            .map_err(|e| e.into_op_error(Self::NAME))?;
        sink.flush().await.map_err(FileOpError::LocalResource)?;
        drop(sink);

        let mut bytes = Vec::new();
        buffer
            .reader()
            .map_err(FileOpError::LocalResource)?
            .read_to_end(&mut bytes)
            .await
            .map_err(FileOpError::LocalResource)?;
        buffer.close().map_err(FileOpError::LocalResource)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Clone, Debug)]
pub struct WriteFile {
    pub path: String,
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PathPayload {
    pub path: String,
}

#[async_trait]
impl Operation for WriteFile {
    type Output = PathPayload;
    const NAME: &'static str = "write file";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.path)?;
        let buffer = ctx.staging.buffer().map_err(FileOpError::LocalResource)?;
        let mut staged = buffer.writer().map_err(FileOpError::LocalResource)?;
        staged
            .write_all(self.content.as_bytes())
            .await
            .map_err(FileOpError::LocalResource)?;
        staged.flush().await.map_err(FileOpError::LocalResource)?;
        drop(staged);

        let mut source = buffer.reader().map_err(FileOpError::LocalResource)?;
        ctx.transport
            .upload(&self.path, &mut source)
            .await
            .map_err(|e| e.into_op_error(Self::NAME))?;
        drop(source);
        buffer.close().map_err(FileOpError::LocalResource)?;
        Ok(PathPayload { path: self.path })
    }
}

pub struct UploadFile<'a> {
    pub dest_dir: String,
    pub file_name: String,
    pub source: &'a mut (dyn AsyncRead + Unpin + Send),
}

#[derive(Clone, Debug, Serialize)]
pub struct UploadedFile {
    pub name: String,
    pub path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[async_trait]
impl<'a> Operation for UploadFile<'a> {
    type Output = UploadedFile;
    const NAME: &'static str = "upload file";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_leaf(&self.file_name)?;
        let path = join_remote(&self.dest_dir, &self.file_name);
        let size = ctx
            .transport
            .upload(&path, self.source)
            .await
            .map_err(|e| e.into_op_error(Self::NAME))?;
        Ok(UploadedFile {
            name: self.file_name,
            path,
            size,
            kind: EntryKind::File,
        })
    }
}

#[derive(Clone, Debug)]
pub struct RenameEntry {
    pub old_path: String,
    pub new_path: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamedEntry {
    pub old_path: String,
    pub new_path: String,
}

#[async_trait]
impl Operation for RenameEntry {
    type Output = RenamedEntry;
    const NAME: &'static str = "rename";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.old_path)?;
        validate_path(&self.new_path)?;
        ctx.transport
            .rename(&self.old_path, &self.new_path)
            .await
            .map_err(|e| e.into_op_error(Self::NAME))?;
        Ok(RenamedEntry {
            old_path: self.old_path,
            new_path: self.new_path,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DeleteFile {
    pub path: String,
}

#[async_trait]
impl Operation for DeleteFile {
    type Output = PathPayload;
    const NAME: &'static str = "delete file";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.path)?;
        ctx.transport
            .remove_file(&self.path)
            .await
            .map_err(|e| e.into_op_error(Self::NAME))?;
        Ok(PathPayload { path: self.path })
    }
}

#[derive(Clone, Debug)]
pub struct DeleteDirectory {
    pub path: String,
}

#[async_trait]
impl Operation for DeleteDirectory {
    type Output = PathPayload;
    const NAME: &'static str = "delete directory";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.path)?;
        let cmd = RemoteCommand::new("rm").args(["-rf", "--", self.path.as_str()]);
        ctx.run(Self::NAME, cmd).await?.check()?;
        Ok(PathPayload { path: self.path })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub execute: bool,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

impl PermissionRequest {
    pub fn mode(&self) -> String {
        let digit = u8::from(self.read) * 4 + u8::from(self.write) * 2 + u8::from(self.execute);
        digit.to_string().repeat(3)
    }

    fn ownership(&self) -> Result<Option<String>, FileOpError> {
        let owner = non_empty(self.owner.as_deref());
        let group = non_empty(self.group.as_deref());
        for name in owner.iter().chain(group.iter()) {
            if name.contains(':') || name.chars().any(char::is_whitespace) {
                return Err(FileOpError::Invalid(format!(
                    "{:?} is not a valid owner or group name",
                    name
                )));
            }
        }
        Ok(match (owner, group) {
            (Some(o), Some(g)) => Some(format!("{}:{}", o, g)),
            (Some(o), None) => Some(o.to_string()),
            (None, Some(g)) => Some(format!(":{}", g)),
            (None, None) => None,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone, Debug)]
pub struct ChangePermissions {
    pub path: String,
    pub permissions: PermissionRequest,
}

#[derive(Clone, Debug, Serialize)]
pub struct AppliedPermissions {
    pub mode: String,
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PermissionChange {
    pub path: String,
    pub permissions: AppliedPermissions,
}

#[async_trait]
impl Operation for ChangePermissions {
    type Output = PermissionChange;
    const NAME: &'static str = "change permissions";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.path)?;
        let mode = self.permissions.mode();
        let mut cmd =
            RemoteCommand::new("chmod").args(["--", mode.as_str(), self.path.as_str()]);
        if let Some(owner_group) = self.permissions.ownership()? {
            let chown =
                RemoteCommand::new("chown").args(["--", owner_group.as_str(), self.path.as_str()]);
            cmd = cmd.and_then(chown);
        }
        ctx.run(Self::NAME, cmd).await?.check()?;

        let req = self.permissions;
        Ok(PermissionChange {
            path: self.path,
            permissions: AppliedPermissions {
                mode,
                read: req.read,
                write: req.write,
                execute: req.execute,
                owner: non_empty(req.owner.as_deref()).map(str::to_string),
                group: non_empty(req.group.as_deref()).map(str::to_string),
            },
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferredEntry {
    pub source_path: String,
    pub destination_path: String,
}

#[derive(Clone, Debug)]
pub struct CopyEntry {
    pub source: String,
    pub destination: String,
}

#[async_trait]
impl Operation for CopyEntry {
    type Output = TransferredEntry;
    const NAME: &'static str = "copy";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.source)?;
        validate_path(&self.destination)?;
        let cmd = RemoteCommand::new("cp").args([
            "-r",
            "--",
            self.source.as_str(),
            self.destination.as_str(),
        ]);
        ctx.run(Self::NAME, cmd).await?.check()?;
        Ok(TransferredEntry {
            source_path: self.source,
            destination_path: self.destination,
        })
    }
}

#[derive(Clone, Debug)]
pub struct MoveEntry {
    pub source: String,
    pub destination: String,
}

#[async_trait]
impl Operation for MoveEntry {
    type Output = TransferredEntry;
    const NAME: &'static str = "move";

    async fn execute(self, ctx: &OpContext<'_>) -> Result<Self::Output, FileOpError> {
        validate_path(&self.source)?;
        validate_path(&self.destination)?;
        if ctx.require_atomic_move {
            ensure_same_filesystem(ctx, &self.source, &self.destination).await?;
        }
        let cmd = RemoteCommand::new("mv").args([
            "--",
            self.source.as_str(),
            self.destination.as_str(),
        ]);
        ctx.run(Self::NAME, cmd).await?.check()?;
        Ok(TransferredEntry {
            source_path: self.source,
            destination_path: self.destination,
        })
    }
}

async fn ensure_same_filesystem(
    ctx: &OpContext<'_>,
    source: &str,
    destination: &str,
) -> Result<(), FileOpError> {
    let target_dir = parent_of(destination);
    let gnu = RemoteCommand::new("stat").args(["-c", "%d", "--", source, target_dir.as_str()]);
    let mut out = ctx.run(MoveEntry::NAME, gnu).await?;
    if out.status != Some(0) && rejects_gnu_flags(&out.stderr) {
        let bsd = RemoteCommand::new("stat").args(["-f", "%d", "--", source, target_dir.as_str()]);
        out = ctx.run(MoveEntry::NAME, bsd).await?;
    }
    let out = out.check()?;
    match out.stdout.split_whitespace().collect::<Vec<_>>().as_slice() {
        [from, to] if from == to => Ok(()),
        [from, to] => Err(FileOpError::Invalid(format!(
            "{} (device {}) and {} (device {}) are on different filesystems, refusing a non-atomic move",
            source, from, target_dir, to
        ))),
        _ => Err(FileOpError::Subprotocol {
            op: MoveEntry::NAME,
            detail: format!("unexpected device query output {:?}", out.stdout.trim_end()),
        }),
    }
}

// BSD stat says "illegal option", GNU stat "invalid option".
fn rejects_gnu_flags(stderr: &str) -> bool {
    stderr.contains("illegal option") || stderr.contains("invalid option")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::DirRecord;
    use crate::testing::FakeTransport;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    fn ctx<'a>(transport: &'a FakeTransport, staging: &'a StagingArea) -> OpContext<'a> {
        OpContext {
            transport,
            staging,
            require_atomic_move: true,
        }
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn list_directory_scenario() {
        let fake = FakeTransport::default().with_listing(
            "/var/www/html",
            vec![DirRecord {
                filename: "wp-content".into(),
                longname: "drwxr-xr-x 2 www-data www-data".into(),
                ..Default::default()
            }],
        );
        let staging = StagingArea::default();
        let entries = ListDirectory {
            path: "/var/www/html".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/var/www/html/wp-content");
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[0].size, 0);
    }

    #[tokio::test]
    async fn unreadable_directory_is_an_error() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        let err = ListDirectory {
            path: "/nope".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Failed to list directory: No such file");
    }

    #[tokio::test]
    async fn create_directory_payload() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        let created = CreateDirectory {
            parent: "/srv/".into(),
            name: "uploads".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            json!({ "name": "uploads", "path": "/srv/uploads", "type": "directory" })
        );
        assert_eq!(*fake.dirs.lock(), vec!["/srv/uploads".to_string()]);

        let err = CreateDirectory {
            parent: "/srv".into(),
            name: "../etc".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap_err();
        assert!(matches!(err, FileOpError::Invalid(_)));
        assert_eq!(fake.dirs.lock().len(), 1);
    }

    #[tokio::test]
    async fn write_then_read_returns_same_text() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(Some(dir.path().to_path_buf()));
        let fake = FakeTransport::default();
        let text = "<?php\n// héllo wörld\necho 'ok';\n";

        let written = WriteFile {
            path: "/var/www/html/index.php".into(),
            content: text.into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(written.path, "/var/www/html/index.php");
        assert_eq!(staged_files(dir.path()), 0);

        let read = ReadFile {
            path: "/var/www/html/index.php".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(read, text);
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn failed_read_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(Some(dir.path().to_path_buf()));
        let fake = FakeTransport::default();
        let err = ReadFile {
            path: "/missing".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap_err();
        assert!(matches!(err, FileOpError::Subprotocol { op: "read file", .. }));
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(Some(dir.path().to_path_buf()));
        let fake = FakeTransport::default();
        fake.fail_channel.store(true, Ordering::SeqCst);
        let err = WriteFile {
            path: "/var/www/html/index.php".into(),
            content: "<?php echo 'ok';\n".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap_err();
        assert!(matches!(err, FileOpError::Transport { op: "write file", .. }));
        assert_eq!(staged_files(dir.path()), 0);
        assert!(fake.file("/var/www/html/index.php").is_none());
    }

    #[tokio::test]
    async fn read_decodes_invalid_utf8_lossily() {
        let fake = FakeTransport::default().with_file("/bin.dat", &[b'o', b'k', 0xff]);
        let staging = StagingArea::default();
        let text = ReadFile {
            path: "/bin.dat".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(text, "ok\u{fffd}");
    }

    #[tokio::test]
    async fn upload_reports_size() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        let mut body: &[u8] = b"\x89PNG\r\n\x1a\n rest";
        let uploaded = UploadFile {
            dest_dir: "/srv/media".into(),
            file_name: "logo.png".into(),
            source: &mut body,
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(
            serde_json::to_value(&uploaded).unwrap(),
            json!({ "name": "logo.png", "path": "/srv/media/logo.png", "size": 13, "type": "file" })
        );
        assert_eq!(fake.file("/srv/media/logo.png").unwrap().len(), 13);
    }

    #[tokio::test]
    async fn rename_and_delete_file() {
        let fake = FakeTransport::default().with_file("/srv/a.txt", b"a");
        let staging = StagingArea::default();
        let renamed = RenameEntry {
            old_path: "/srv/a.txt".into(),
            new_path: "/srv/b.txt".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(
            serde_json::to_value(&renamed).unwrap(),
            json!({ "oldPath": "/srv/a.txt", "newPath": "/srv/b.txt" })
        );
        DeleteFile {
            path: "/srv/b.txt".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert!(fake.files.lock().is_empty());
    }

    #[tokio::test]
    async fn delete_directory_failure_scenario() {
        let fake = FakeTransport::default();
        fake.script(
            CommandOutput::exited(1).with_stderr("rm: cannot remove '/x': Permission denied\n"),
        );
        let staging = StagingArea::default();
        let err = DeleteDirectory { path: "/x".into() }
            .execute(&ctx(&fake, &staging))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command failed with code 1: rm: cannot remove '/x': Permission denied"
        );
        assert_eq!(fake.commands(), vec!["rm -rf -- /x".to_string()]);
    }

    #[tokio::test]
    async fn chmod_without_owner_skips_chown() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        let change = ChangePermissions {
            path: "/srv/app/config.php".into(),
            permissions: PermissionRequest {
                read: true,
                write: true,
                execute: false,
                ..Default::default()
            },
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(change.permissions.mode, "666");
        assert_eq!(fake.commands(), vec!["chmod -- 666 /srv/app/config.php".to_string()]);
    }

    #[tokio::test]
    async fn chmod_chains_chown() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        ChangePermissions {
            path: "/srv/app".into(),
            permissions: PermissionRequest {
                read: true,
                write: true,
                execute: true,
                owner: Some("www-data".into()),
                group: Some("www-data".into()),
            },
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        ChangePermissions {
            path: "/srv/app".into(),
            permissions: PermissionRequest {
                read: true,
                execute: true,
                group: Some("staff".into()),
                ..Default::default()
            },
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(
            fake.commands(),
            vec![
                "chmod -- 777 /srv/app && chown -- 'www-data:www-data' /srv/app".to_string(),
                "chmod -- 555 /srv/app && chown -- ':staff' /srv/app".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn chmod_rejects_colon_in_owner() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        let err = ChangePermissions {
            path: "/srv".into(),
            permissions: PermissionRequest {
                owner: Some("root:root".into()),
                ..Default::default()
            },
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap_err();
        assert!(matches!(err, FileOpError::Invalid(_)));
        assert!(fake.commands().is_empty());
    }

    #[tokio::test]
    async fn copy_quotes_paths() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        let copied = CopyEntry {
            source: "/srv/my site".into(),
            destination: "/srv/backup".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(fake.commands(), vec!["cp -r -- '/srv/my site' /srv/backup".to_string()]);
        assert_eq!(
            serde_json::to_value(&copied).unwrap(),
            json!({ "sourcePath": "/srv/my site", "destinationPath": "/srv/backup" })
        );
    }

    #[tokio::test]
    async fn move_checks_devices_first() {
        let fake = FakeTransport::default();
        fake.script(CommandOutput::exited(0).with_stdout("2049\n2049\n"));
        let staging = StagingArea::default();
        MoveEntry {
            source: "/srv/a".into(),
            destination: "/srv/archive/a".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        assert_eq!(
            fake.commands(),
            vec![
                "stat -c '%d' -- /srv/a /srv/archive".to_string(),
                "mv -- /srv/a /srv/archive/a".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn move_refuses_cross_filesystem() {
        let fake = FakeTransport::default();
        fake.script(CommandOutput::exited(0).with_stdout("2049\n66306\n"));
        let staging = StagingArea::default();
        let err = MoveEntry {
            source: "/srv/a".into(),
            destination: "/mnt/nfs/a".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap_err();
        assert!(matches!(err, FileOpError::Invalid(_)));
        assert!(err.to_string().contains("different filesystems"));
        assert_eq!(fake.commands().len(), 1);
    }

    #[tokio::test]
    async fn move_falls_back_to_bsd_stat() {
        let fake = FakeTransport::default();
        fake.script(
            CommandOutput::exited(1).with_stderr("stat: illegal option -- c\nusage: stat [-FLnq]\n"),
        );
        fake.script(CommandOutput::exited(0).with_stdout("16777220\n16777220\n"));
        let staging = StagingArea::default();
        MoveEntry {
            source: "/Users/me/a".into(),
            destination: "/Users/me/b".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap();
        let commands = fake.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1], "stat -f '%d' -- /Users/me/a /Users/me");
    }

    #[tokio::test]
    async fn missing_path_named_like_an_option_does_not_retry() {
        let fake = FakeTransport::default();
        fake.script(CommandOutput::exited(1).with_stderr(
            "stat: cannot statx '/srv/options': No such file or directory\n",
        ));
        let staging = StagingArea::default();
        let err = MoveEntry {
            source: "/srv/options".into(),
            destination: "/srv/archive/options".into(),
        }
        .execute(&ctx(&fake, &staging))
        .await
        .unwrap_err();
        assert!(matches!(err, FileOpError::CommandFailed { code: 1, .. }));
        assert!(err.to_string().contains("No such file or directory"));
        assert_eq!(fake.commands().len(), 1);
    }

    #[tokio::test]
    async fn move_without_atomic_check() {
        let fake = FakeTransport::default();
        let staging = StagingArea::default();
        let ctx = OpContext {
            transport: &fake,
            staging: &staging,
            require_atomic_move: false,
        };
        MoveEntry {
            source: "/srv/a".into(),
            destination: "/srv/b".into(),
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert_eq!(fake.commands(), vec!["mv -- /srv/a /srv/b".to_string()]);
    }
}
