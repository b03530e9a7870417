/// An owned IRC message.
///
/// Contains the complete parsed representation of one protocol line: the
/// optional origin prefix, the command, and the ordered parameter list
/// (the trailing parameter already stripped of its `:` sentinel).
///
/// # Example
///
/// ```
/// use slirc_proto::Message;
///
/// let msg: Message = ":host 001 me :Welcome".parse().unwrap();
/// assert_eq!(msg.prefix.as_deref(), Some("host"));
/// assert_eq!(msg.command, "001");
/// assert_eq!(msg.params, vec!["me", "Welcome"]);
///
/// let msg = Message::new("PRIVMSG", ["#rust", "hello there"]);
/// assert_eq!(msg.to_string(), "PRIVMSG #rust :hello there");
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// Message origin (e.g. `nick!user@host` or a server name), without `:`.
    pub prefix: Option<String>,
    /// The command name or three-digit numeric.
    pub command: String,
    /// Command parameters, including the trailing one.
    pub params: Vec<String>,
}

impl Message {
    /// Create a message without a prefix.
    pub fn new<C, I, P>(command: C, params: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach an origin prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Nickname of the sender for a `nick!user@host`, `nick@host` or bare
    /// `nick` prefix. A bare name containing a dot is a server.
    pub fn source_nickname(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let end = prefix.find(['!', '@']);
        let nick = &prefix[..end.unwrap_or(prefix.len())];
        if nick.is_empty() || (end.is_none() && nick.contains('.')) {
            return None;
        }
        Some(nick)
    }

    /// Get a parameter by position.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Get the last parameter, if any.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Whether the command is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// Event name this message is published under (`raw:<COMMAND>`).
    pub fn event_name(&self) -> String {
        format!("raw:{}", self.command)
    }
}
