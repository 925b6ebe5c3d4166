use shell_escape::unix::escape;
use std::borrow::Cow;
use std::fmt;

/// A remote shell command assembled from argument vectors. Every argument is
/// POSIX-quoted on render; steps are chained with `&&`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCommand {
    steps: Vec<Vec<String>>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            steps: vec![vec![program.into()]],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.push(arg.into());
        }
        self
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().fold(self, |cmd, a| cmd.arg(a))
    }

    pub fn and_then(mut self, next: RemoteCommand) -> Self {
        self.steps.extend(next.steps);
        self
    }

    pub fn programs(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter_map(|step| step.first().map(String::as_str))
    }

    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                step.iter()
                    .map(|arg| escape(Cow::Borrowed(arg.as_str())).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
