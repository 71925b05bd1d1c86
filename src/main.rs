use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use clap::Parser;

use breadbin_core::{FileSystem, BLOCK_SIZE};
use breadbin_traits::{BlockDevice, BlockIndex};

#[derive(Debug, clap::Parser)]
#[command(name = "breadbin")]
struct Args {
    #[arg(long, short, default_value = "data.crumb")]
    data_path: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Size the backing file and write an empty file system into it.
    Format {
        #[arg(short, long, default_value_t = 1024)]
        blocks: u32,
    },
    /// Print the superblock and every allocated inode.
    Debug,
}

struct FileDevice {
    file: File,
    blocks: u32,
    mounted: bool,
}

impl FileDevice {
    fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<FileDevice> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(anyhow::Error::msg(
                "file is not a multiple of the block size",
            ));
        }

        Ok(FileDevice {
            file,
            blocks: u32::try_from(len / BLOCK_SIZE as u64)?,
            mounted: false,
        })
    }

    fn open_for_format<P: AsRef<Path>>(path: P, blocks: u32) -> anyhow::Result<FileDevice> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        file.set_len(blocks as u64 * BLOCK_SIZE as u64)?;

        Ok(FileDevice {
            file,
            blocks,
            mounted: false,
        })
    }

    fn seek(&mut self, block: BlockIndex) -> Result<(), breadbin_traits::Error> {
        if block.0 >= self.blocks {
            return Err(breadbin_traits::Error::OutOfBounds);
        }
        self.file
            .seek(SeekFrom::Start(block.0 as u64 * BLOCK_SIZE as u64))
            .map_err(|_| breadbin_traits::Error::Io)?;

        Ok(())
    }
}

impl BlockDevice<BLOCK_SIZE> for FileDevice {
    fn size(&self) -> u32 {
        self.blocks
    }

    fn mounted(&self) -> bool {
        self.mounted
    }

    fn mount(&mut self) {
        self.mounted = true;
    }

    fn read(
        &mut self,
        block: BlockIndex,
        buffer: &mut [u8; BLOCK_SIZE],
    ) -> Result<(), breadbin_traits::Error> {
        self.seek(block)?;
        self.file
            .read_exact(buffer.as_mut_slice())
            .map_err(|_| breadbin_traits::Error::Io)?;

        Ok(())
    }

    fn write(
        &mut self,
        block: BlockIndex,
        buffer: &[u8; BLOCK_SIZE],
    ) -> Result<(), breadbin_traits::Error> {
        self.seek(block)?;
        self.file
            .write_all(buffer.as_slice())
            .map_err(|_| breadbin_traits::Error::Io)?;

        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Format { blocks } => {
            let mut device = FileDevice::open_for_format(args.data_path, blocks)?;
            FileSystem::format(&mut device)?;
        }
        Command::Debug => {
            let mut device = FileDevice::open(args.data_path)?;
            print!("{}", FileSystem::debug_dump(&mut device)?);
        }
    }

    Ok(())
}
