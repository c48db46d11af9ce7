use std::sync::Arc;

use crate::error::ExecError;
use crate::remote::command;
use crate::remote::stat::{parse_long_listing, RemoteFileInfo};
use crate::session::{SessionHandle, SessionRegistry};
use crate::transport::ExecOutput;

/// Runs path-bearing commands against the current session.
///
/// Every call checks the connection first and fails with
/// [`ExecError::NotConnected`] without trying to reconnect. Nothing is
/// retried.
#[derive(Clone)]
pub struct RemoteCommandExecutor {
    registry: Arc<SessionRegistry>,
}

impl RemoteCommandExecutor {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    async fn handle(&self) -> Result<Arc<SessionHandle>, ExecError> {
        self.registry
            .connected()
            .await
            .ok_or(ExecError::NotConnected)
    }

    /// Runs an arbitrary command. The caller is responsible for quoting.
    pub async fn exec(&self, command: &str) -> Result<ExecOutput, ExecError> {
        self.handle().await?.run(command).await
    }

    /// Names in `path`, in `ls` order.
    pub async fn list(&self, path: &str) -> Result<Vec<String>, ExecError> {
        let output = self.exec(&command::list(path)).await?;
        Ok(parse_listing(&output.stdout))
    }

    pub async fn stat(&self, path: &str, name: &str) -> Result<RemoteFileInfo, ExecError> {
        let cmd = command::stat(path, name);
        let output = self.exec(&cmd).await?;
        parse_long_listing(&cmd, &output.stdout)
    }

    pub async fn mkdir(&self, path: &str, name: &str) -> Result<(), ExecError> {
        self.exec(&command::mkdir(path, name)).await.map(drop)
    }

    pub async fn remove(&self, path: &str, name: &str) -> Result<(), ExecError> {
        self.exec(&command::remove(path, name)).await.map(drop)
    }

    pub async fn rename(&self, path: &str, name: &str, new_name: &str) -> Result<(), ExecError> {
        self.exec(&command::rename(path, name, new_name))
            .await
            .map(drop)
    }

    pub async fn move_entry(
        &self,
        name: &str,
        src_path: &str,
        dst_path: &str,
    ) -> Result<(), ExecError> {
        self.exec(&command::move_entry(name, src_path, dst_path))
            .await
            .map(drop)
    }

    /// Working directory of a fresh remote shell.
    pub async fn home_directory(&self) -> Result<String, ExecError> {
        let cmd = command::home();
        let output = self.exec(&cmd).await?;
        let home = output.stdout.trim();
        if !home.starts_with('/') {
            return Err(ExecError::UnexpectedOutput {
                command: cmd,
                output: home.to_string(),
            });
        }
        Ok(home.to_string())
    }
}

/// Non-empty lines of `ls` output.
pub fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionDescriptor;
    use crate::session::MemorySessionStore;
    use crate::transport::fake::{FakeConnection, FakeTransport};

    async fn connected() -> (RemoteCommandExecutor, Arc<FakeConnection>) {
        let transport = FakeTransport::new();
        let registry = Arc::new(SessionRegistry::new(
            transport.clone(),
            Arc::new(MemorySessionStore::new()),
        ));
        registry
            .connect(SessionDescriptor::new("h", "u"))
            .await
            .unwrap();
        (RemoteCommandExecutor::new(registry), transport.last().unwrap())
    }

    #[tokio::test]
    async fn test_fails_fast_without_session() {
        let registry = Arc::new(SessionRegistry::new(
            FakeTransport::new(),
            Arc::new(MemorySessionStore::new()),
        ));
        let executor = RemoteCommandExecutor::new(registry);
        assert!(matches!(
            executor.list("/").await,
            Err(ExecError::NotConnected)
        ));
        assert!(matches!(
            executor.mkdir("/", "x").await,
            Err(ExecError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_fails_fast_on_dropped_connection() {
        let (executor, connection) = connected().await;
        connection.set_connected(false);
        assert!(matches!(
            executor.remove("/tmp", "x").await,
            Err(ExecError::NotConnected)
        ));
        assert!(connection.commands().is_empty());
    }

    #[tokio::test]
    async fn test_list_splits_names() {
        let (executor, connection) = connected().await;
        connection.respond(
            command::list("/home/u"),
            ExecOutput::success("a.txt\nb\n\nMy Files\n"),
        );

        let names = executor.list("/home/u").await.unwrap();
        assert_eq!(names, vec!["a.txt", "b", "My Files"]);
    }

    #[tokio::test]
    async fn test_list_of_spaced_path_is_quoted() {
        let (executor, connection) = connected().await;
        executor.list("/home/u/My Documents").await.unwrap();
        assert_eq!(
            connection.commands(),
            vec!["cd '/home/u/My Documents' && ls -1"]
        );
    }

    #[tokio::test]
    async fn test_stat_parses_info() {
        let (executor, connection) = connected().await;
        connection.respond(
            command::stat("/srv", "data"),
            ExecOutput::success("drwxr-x--- 3 www www 4096 Feb 10 09:15 data\n"),
        );

        let info = executor.stat("/srv", "data").await.unwrap();
        assert_eq!(info.owner, "www");
        assert_eq!(info.size, 4096);
        assert_eq!(info.permissions.is_directory(), Some(true));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_exec_error() {
        let (executor, connection) = connected().await;
        connection.respond(
            command::mkdir("/root", "x"),
            ExecOutput::failure(1, "mkdir: cannot create directory 'x': Permission denied"),
        );

        match executor.mkdir("/root", "x").await {
            Err(ExecError::NonZeroExit { code, stderr, .. }) => {
                assert_eq!(code, 1);
                assert!(stderr.contains("Permission denied"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mutating_commands() {
        let (executor, connection) = connected().await;
        executor.remove("/tmp", "x").await.unwrap();
        executor.rename("/tmp", "a", "b").await.unwrap();
        executor.move_entry("b", "/tmp", "/srv").await.unwrap();

        assert_eq!(
            connection.commands(),
            vec![
                command::remove("/tmp", "x"),
                command::rename("/tmp", "a", "b"),
                command::move_entry("b", "/tmp", "/srv"),
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let (executor, connection) = connected().await;
        connection.fail_transport(true);
        let err = executor.list("/").await.unwrap_err();
        assert!(err.is_connection_loss());
    }

    #[tokio::test]
    async fn test_home_directory() {
        let (executor, connection) = connected().await;
        connection.respond(command::home(), ExecOutput::success("/home/u\n"));
        assert_eq!(executor.home_directory().await.unwrap(), "/home/u");
    }
}
