//! Human-readable beat-map printing, ported from `print_beat_map` in the
//! reference `tbon.py` driver: ten bars per line, each field right-aligned
//! to four characters, with the first row padded so bar numbers line up
//! under a shared `first_bar_number` origin.

pub fn print_beat_map(part_number: u32, beat_map: &[u32], first_bar_number: u32) {
    let pad = "    ";
    let pad_count = (first_bar_number % 10) as usize;
    let mut remapped: Vec<Option<u32>> = vec![None; pad_count];
    remapped.extend(beat_map.iter().copied().map(Some));

    println!("Part {part_number} Beat Map: Number of beats in each bar");

    let mut bar_number = 10 * (first_bar_number / 10);
    let mut line_count = 0usize;
    loop {
        let mut line = format!("{bar_number:4}:");
        let mut end_of_map = false;
        for i in 0..10 {
            match remapped.get(10 * line_count + i) {
                Some(Some(n)) => line.push_str(&format!(" {n:4}")),
                Some(None) => line.push_str(&format!(" {pad}")),
                None => {
                    end_of_map = true;
                    line.push_str(&format!(" {pad}"));
                }
            }
        }
        println!("{line}");
        line_count += 1;
        bar_number += 10;
        if end_of_map {
            break;
        }
    }
}
