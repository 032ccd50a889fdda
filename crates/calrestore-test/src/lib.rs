//! Calendar restore - integration test support.
//!
//! Builds dump documents for a given dump version and runs them through the
//! restore engine into an in-memory sink.

pub use calrestore_model as model;
pub use calrestore_restore::{
    EntityKind, MemorySink, Report, RestoreError, RestoreFailure, RestoreOptions,
};

/// Assembles a dump document section by section.
#[derive(Debug, Clone)]
pub struct DumpBuilder {
    major: u32,
    minor: u32,
    dump_date: Option<String>,
    sections: Vec<String>,
}

impl DumpBuilder {
    #[must_use]
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            dump_date: None,
            sections: Vec::new(),
        }
    }

    #[must_use]
    pub fn dump_date(mut self, date: &str) -> Self {
        self.dump_date = Some(date.to_owned());
        self
    }

    /// Appends raw section markup.
    #[must_use]
    pub fn section(mut self, xml: impl Into<String>) -> Self {
        self.sections.push(xml.into());
        self
    }

    /// The users every fixture relies on: admin (1), alice (2) and the
    /// public user (3).
    #[must_use]
    pub fn users(self) -> Self {
        let users = ["admin", "alice", "public-user"]
            .iter()
            .zip(1..)
            .map(|(account, id)| {
                format!(
                    "<user><id>{id}</id><account>{account}</account>\
                     <principalRef>/principals/users/{account}</principalRef></user>"
                )
            })
            .collect::<String>();
        self.section(format!("<users>{users}</users>"))
    }

    /// The `/user` root plus alice's home and her calendar at
    /// `/user/alice/calendar`.
    #[must_use]
    pub fn homes(self) -> Self {
        self.section(
            "<collections>\
             <collection><name>user</name><path>/user</path><calType>0</calType>\
             <public>true</public></collection>\
             <collection><name>alice</name><path>/user/alice</path><colPath>/user</colPath>\
             <calType>0</calType><owner><user><account>alice</account></user></owner></collection>\
             <collection><name>calendar</name><path>/user/alice/calendar</path>\
             <colPath>/user/alice</colPath><calType>1</calType>\
             <owner><user><account>alice</account></user></owner></collection>\
             </collections>",
        )
    }

    #[must_use]
    pub fn build(&self) -> String {
        let date = self
            .dump_date
            .as_deref()
            .map(|d| format!("<dumpDate>{d}</dumpDate>"))
            .unwrap_or_default();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <caldata><majorVersion>{}</majorVersion><minorVersion>{}</minorVersion>\
             <updateVersion>0</updateVersion>{date}{}</caldata>",
            self.major,
            self.minor,
            self.sections.concat()
        )
    }
}

/// Owner element in the form the given dump version writes.
#[must_use]
pub fn owner(minor: u32, account: &str) -> String {
    if minor < 5 {
        format!("<owner-key><account>{account}</account><kind>1</kind></owner-key>")
    } else {
        format!("<owner><user><account>{account}</account></user></owner>")
    }
}

/// Result of one run together with everything the sink received.
pub struct Outcome {
    pub result: Result<Report, Box<RestoreFailure>>,
    pub sink: MemorySink,
}

impl Outcome {
    /// The report whether or not the run finished.
    #[must_use]
    pub fn report(&self) -> &Report {
        match &self.result {
            Ok(report) => report,
            Err(failure) => &failure.report,
        }
    }
}

/// Restores `xml` with `options` into a fresh [`MemorySink`].
#[must_use]
pub fn restore_with(xml: &str, options: RestoreOptions) -> Outcome {
    let mut sink = MemorySink::new();
    let result = calrestore_restore::restore(xml.as_bytes(), &mut sink, options);
    Outcome { result, sink }
}

/// Restores `xml` with default options.
#[must_use]
pub fn restore(xml: &str) -> Outcome {
    restore_with(xml, RestoreOptions::default())
}
