//! Interactive command menu
//!
//! The menu holds at most one open index. Engine errors are reported and the
//! loop continues; a handle left unusable by a failed write is dropped so the
//! user re-opens the file.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing::{debug, warn};

use bindex_engine::{ImportFormat, IndexError, IndexFile, IndexOptions, InsertOutcome};

/// Menu entries, selectable by number or keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Create,
    Open,
    Insert,
    Search,
    Load,
    Print,
    Extract,
    Quit,
}

impl Command {
    fn parse(choice: &str) -> Option<Self> {
        match choice.trim().to_lowercase().as_str() {
            "1" | "create" => Some(Command::Create),
            "2" | "open" => Some(Command::Open),
            "3" | "insert" => Some(Command::Insert),
            "4" | "search" => Some(Command::Search),
            "5" | "load" => Some(Command::Load),
            "6" | "print" => Some(Command::Print),
            "7" | "extract" => Some(Command::Extract),
            "8" | "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

const MENU: &str = "\n--- B-Tree Index File Menu ---\n\
1. CREATE   create a new index file\n\
2. OPEN     open an existing index file\n\
3. INSERT   insert a key/value pair\n\
4. SEARCH   look up a key\n\
5. LOAD     load pairs from a dump file\n\
6. PRINT    print every node of the index\n\
7. EXTRACT  write all pairs to a text file\n\
8. QUIT";

pub struct Menu<R: BufRead, W: Write> {
    input: R,
    out: W,
    options: IndexOptions,
    session: Option<IndexFile>,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    pub fn new(input: R, out: W, options: IndexOptions) -> Self {
        Menu {
            input,
            out,
            options,
            session: None,
        }
    }

    /// Run until QUIT or end of input
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            writeln!(self.out, "{}", MENU)?;
            let Some(choice) = self.prompt("Choose an option: ")? else {
                break;
            };

            let command = match Command::parse(&choice) {
                Some(Command::Quit) => {
                    writeln!(self.out, "Exiting.")?;
                    break;
                }
                Some(command) => command,
                None => {
                    writeln!(self.out, "Invalid option, please try again.")?;
                    continue;
                }
            };

            debug!("Menu command {:?}", command);
            if let Err(e) = self.execute(command) {
                self.report(e)?;
            }
        }

        if let Some(index) = self.session.take() {
            if let Err(e) = index.close() {
                warn!("Closing index failed: {}", e);
            }
        }
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn execute(&mut self, command: Command) -> Result<(), IndexError> {
        match command {
            Command::Create => self.create(),
            Command::Open => self.open(),
            Command::Insert => self.insert(),
            Command::Search => self.search(),
            Command::Load => self.load(),
            Command::Print => self.print(),
            Command::Extract => self.extract(),
            Command::Quit => Ok(()),
        }
    }

    fn create(&mut self) -> Result<(), IndexError> {
        let Some(path) = self.prompt_path("Enter the filename to create: ")? else {
            return Ok(());
        };
        if path.exists() && !self.confirm("File exists. Overwrite? (y/n): ")? {
            writeln!(self.out, "Create cancelled.")?;
            return Ok(());
        }

        // Release the previous file before replacing it
        self.session = None;
        let index = IndexFile::create(&path, true, self.options.clone())?;
        self.session = Some(index);
        writeln!(self.out, "Created index file {}.", path.display())?;
        Ok(())
    }

    fn open(&mut self) -> Result<(), IndexError> {
        let Some(path) = self.prompt_path("Enter the filename to open: ")? else {
            return Ok(());
        };
        let index = IndexFile::open(&path, self.options.clone())?;
        let stats = index.stats();
        self.session = Some(index);
        writeln!(
            self.out,
            "Opened index file {} ({} nodes).",
            path.display(),
            stats.node_count
        )?;
        Ok(())
    }

    fn insert(&mut self) -> Result<(), IndexError> {
        if !self.has_session()? {
            return Ok(());
        }
        let Some(key) = self.prompt_u64("Enter the key (unsigned integer): ")? else {
            return Ok(());
        };
        let Some(value) = self.prompt_u64("Enter the value (unsigned integer): ")? else {
            return Ok(());
        };

        let Some(index) = self.session.as_mut() else {
            return Ok(());
        };
        match index.insert(key, value)? {
            InsertOutcome::Inserted => writeln!(self.out, "Inserted ({}, {}).", key, value)?,
            InsertOutcome::Updated { previous } => writeln!(
                self.out,
                "Updated key {}: {} -> {}.",
                key, previous, value
            )?,
        }
        Ok(())
    }

    fn search(&mut self) -> Result<(), IndexError> {
        if !self.has_session()? {
            return Ok(());
        }
        let Some(key) = self.prompt_u64("Enter the key to search for: ")? else {
            return Ok(());
        };

        let Some(index) = self.session.as_mut() else {
            return Ok(());
        };
        match index.get(key)? {
            Some(value) => writeln!(self.out, "Key {}: value {}", key, value)?,
            None => writeln!(self.out, "Key {} not found.", key)?,
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), IndexError> {
        if !self.has_session()? {
            return Ok(());
        }
        let Some(path) = self.prompt_path("Enter the name of the file to load from: ")? else {
            return Ok(());
        };

        let Some(index) = self.session.as_mut() else {
            return Ok(());
        };
        let report = index.import_file(&path, ImportFormat::Auto)?;
        writeln!(
            self.out,
            "Loaded {} as {}: {} inserted, {} updated, {} sentinel pairs skipped.",
            path.display(),
            report.format,
            report.inserted,
            report.updated,
            report.skipped
        )?;
        Ok(())
    }

    fn print(&mut self) -> Result<(), IndexError> {
        if !self.has_session()? {
            return Ok(());
        }
        let Some(index) = self.session.as_mut() else {
            return Ok(());
        };
        let summary = index.print(&mut self.out)?;
        if summary.corrupt > 0 || summary.missing > 0 {
            writeln!(
                self.out,
                "{} unreadable node(s), {} missing block(s).",
                summary.corrupt, summary.missing
            )?;
        }
        Ok(())
    }

    fn extract(&mut self) -> Result<(), IndexError> {
        if !self.has_session()? {
            return Ok(());
        }
        let Some(path) = self.prompt_path("Enter the name of the file to extract to: ")? else {
            return Ok(());
        };
        if path.exists() && !self.confirm("File exists. Overwrite? (y/n): ")? {
            writeln!(self.out, "Extract cancelled.")?;
            return Ok(());
        }

        let Some(index) = self.session.as_mut() else {
            return Ok(());
        };
        let written = index.export_file(&path, true)?;
        writeln!(
            self.out,
            "Extracted {} pairs to {}.",
            written,
            path.display()
        )?;
        Ok(())
    }

    /// Print an engine error, dropping the session if it became unusable
    fn report(&mut self, e: IndexError) -> io::Result<()> {
        writeln!(self.out, "Error: {}", e)?;
        if e.is_fatal() {
            warn!("Index operation failed: {}", e);
        }
        let poisoned = self.session.as_ref().map_or(false, |s| s.is_poisoned());
        if poisoned {
            self.session = None;
            writeln!(self.out, "The index file was closed; open it again to continue.")?;
        }
        Ok(())
    }

    fn has_session(&mut self) -> io::Result<bool> {
        if self.session.is_some() {
            return Ok(true);
        }
        writeln!(self.out, "No index file is open. Use CREATE or OPEN first.")?;
        Ok(false)
    }

    /// Read one trimmed line, `None` at end of input
    fn prompt(&mut self, message: &str) -> io::Result<Option<String>> {
        write!(self.out, "{}", message)?;
        self.out.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn prompt_path(&mut self, message: &str) -> io::Result<Option<PathBuf>> {
        Ok(self
            .prompt(message)?
            .filter(|s| !s.is_empty())
            .map(PathBuf::from))
    }

    fn prompt_u64(&mut self, message: &str) -> io::Result<Option<u64>> {
        let Some(text) = self.prompt(message)? else {
            return Ok(None);
        };
        match text.parse::<u64>() {
            Ok(n) => Ok(Some(n)),
            Err(_) => {
                writeln!(self.out, "'{}' is not an unsigned integer.", text)?;
                Ok(None)
            }
        }
    }

    fn confirm(&mut self, message: &str) -> io::Result<bool> {
        Ok(self
            .prompt(message)?
            .map_or(false, |answer| matches!(answer.to_lowercase().as_str(), "y" | "yes")))
    }
}
