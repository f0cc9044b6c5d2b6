use std::io::Write;

use anyhow::anyhow;
use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::SkillId;

pub trait PacketWriteExt {
    fn write_skill_id(&mut self, id: SkillId) -> anyhow::Result<()>;
}

impl<T: Write> PacketWriteExt for T {
    fn write_skill_id(&mut self, id: SkillId) -> anyhow::Result<()> {
        self.write_u8(id.as_u8())?;
        Ok(())
    }
}

pub trait PacketReadExt {
    fn skip(&mut self, count: usize) -> anyhow::Result<()>;
    fn read_skill_id(&mut self) -> anyhow::Result<SkillId>;

    /// Fails if any payload bytes are left unread. Trailing bytes mean the
    /// peer speaks a different layout, which this versionless protocol has
    /// no way to paper over.
    fn expect_consumed(&self) -> anyhow::Result<()>;
}

impl PacketReadExt for &[u8] {
    fn skip(&mut self, count: usize) -> anyhow::Result<()> {
        if count > self.len() {
            Err(anyhow!("unexpected EOF"))
        } else {
            *self = &self[count..];
            Ok(())
        }
    }

    fn read_skill_id(&mut self) -> anyhow::Result<SkillId> {
        Ok(SkillId::from_u8(self.read_u8()?))
    }

    fn expect_consumed(&self) -> anyhow::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} trailing bytes after payload", self.len()))
        }
    }
}
