use std::fmt::{self, Display, Formatter};

use crate::encode::needs_trailing_sentinel;

use super::types::Message;

/// Wire form without the line terminator.
impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        write!(f, "{}", self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {}", param)?;
            }
            if needs_trailing_sentinel(last) {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }

        Ok(())
    }
}
