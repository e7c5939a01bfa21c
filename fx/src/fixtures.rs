//! Feed documents for tests and offline runs.

/// A trimmed copy of the ECB daily reference feed.
pub const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01" xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
	<gesmes:subject>Reference rates</gesmes:subject>
	<gesmes:Sender>
		<gesmes:name>European Central Bank</gesmes:name>
	</gesmes:Sender>
	<Cube>
		<Cube time='2024-01-05'>
			<Cube currency='USD' rate='1.0921'/>
			<Cube currency='JPY' rate='158.52'/>
			<Cube currency='GBP' rate='0.86060'/>
			<Cube currency='CHF' rate='0.9303'/>
			<Cube currency='SEK' rate='11.1040'/>
			<Cube currency='KRW' rate='1437.81'/>
		</Cube>
	</Cube>
</gesmes:Envelope>"#;

/// Build an ECB-shaped feed dated `time` carrying `rates`.
pub fn feed_with(time: &str, rates: &[(&str, &str)]) -> String {
    let mut cubes = String::new();
    for (currency, rate) in rates {
        cubes.push_str(&format!(
            "\n\t\t\t<Cube currency='{currency}' rate='{rate}'/>"
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01" xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
	<gesmes:subject>Reference rates</gesmes:subject>
	<Cube>
		<Cube time='{time}'>{cubes}
		</Cube>
	</Cube>
</gesmes:Envelope>"#
    )
}
